use neon_demos::basic_shapes::{self, BasicShapes};

fn main() -> anyhow::Result<()> {
    neon_demos::run(basic_shapes::config(), BasicShapes::new())
}
