fn main() {
    if let Err(error) = stage_timer::run() {
        eprintln!("stage-timer: {error}");
        std::process::exit(1);
    }
}
