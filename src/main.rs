fn main() {
    if let Err(error) = prosumer_view_lib::run() {
        eprintln!("prosumer-view: {error}");
        std::process::exit(1);
    }
}
