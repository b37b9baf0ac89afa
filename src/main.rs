fn main() {
    mangrab::cli::run();
}
