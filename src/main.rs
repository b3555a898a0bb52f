use anyhow::Result;

fn main() -> Result<()> {
    notes_live::cli::run()
}
