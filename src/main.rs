fn main() {
    if let Err(err) = dataset_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
