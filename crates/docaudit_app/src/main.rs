fn main() -> anyhow::Result<()> {
    docaudit_app::platform::run_app()
}
