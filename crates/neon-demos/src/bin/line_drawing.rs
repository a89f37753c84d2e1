use neon_demos::line_drawing::{self, LineDrawing};

fn main() -> anyhow::Result<()> {
    neon_demos::run(line_drawing::config(), LineDrawing::new())
}
