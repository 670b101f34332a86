fn main() -> anyhow::Result<()> {
    retina_guardian_lib::run()
}
