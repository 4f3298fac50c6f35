use anyhow::Result;

mod app;
mod logging;

fn main() -> Result<()> {
    let args = stub_move::cli::parse();
    app::run(args)
}
