use neon_demos::hello::{self, HelloWindow};

fn main() -> anyhow::Result<()> {
    neon_demos::run(hello::config(), HelloWindow::new())
}
