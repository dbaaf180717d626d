fn main() {
    regioncheck::cli::start_cli();
}
