fn main() -> anyhow::Result<()> {
    goal_timeline::cli::run()
}
