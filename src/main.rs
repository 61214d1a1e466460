fn main() {
    if let Err(error) = daytrack_lib::run() {
        eprintln!("daytrack: {error}");
        std::process::exit(1);
    }
}
