fn main() {
    if let Err(err) = quiz_ledger::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
