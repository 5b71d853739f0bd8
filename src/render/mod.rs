pub mod events;
pub mod headless;
pub mod terminal;

pub const MARKER_CREATE_EVENT: &str = "marker_create";
pub const MARKER_POSITION_EVENT: &str = "marker_position";
pub const MARKER_DELETE_EVENT: &str = "marker_delete";
pub const SERIES_UPDATE_EVENT: &str = "series_update";
