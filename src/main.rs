fn main() {
    if let Err(e) = glance_sim_lib::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
