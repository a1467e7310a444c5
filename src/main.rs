fn main() -> std::process::ExitCode {
    portquota_lib::run()
}
