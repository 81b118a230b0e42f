// Rationale: encoded planes are reached through data(), never directly.
use vigil_kernel::{Encoding, Frame};

fn main() {
    let frame = Frame::new(0, 2, 2, 85, Encoding::Rgb24, vec![0; 12]);
    let _planes = frame.planes;
}
