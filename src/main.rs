fn main() {
    if let Err(e) = deepchat::cli::main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
