fn main() {
    if let Err(err) = co2e_survey::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
