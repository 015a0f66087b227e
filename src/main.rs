fn main() {
    if let Err(e) = pawspective_lib::run() {
        eprintln!("pawspective: {:#}", e);
        std::process::exit(1);
    }
}
