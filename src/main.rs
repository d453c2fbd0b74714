fn main() -> anyhow::Result<()> {
    nsb_reduce::cli_main::main()
}
