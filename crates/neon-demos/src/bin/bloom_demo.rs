use neon_demos::bloom::{self, BloomDemo};

fn main() -> anyhow::Result<()> {
    neon_demos::run(bloom::config(), BloomDemo::new())
}
