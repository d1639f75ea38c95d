fn main() {
    if let Err(err) = csv_sqlite_import::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
