fn main() -> Result<(), Box<dyn std::error::Error>> {
    sehat::cli::main()
}
