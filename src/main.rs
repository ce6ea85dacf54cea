fn main() {
    if let Err(err) = flexgpt::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
