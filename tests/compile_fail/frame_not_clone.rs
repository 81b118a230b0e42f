// Rationale: frames are shared behind Arc; copies go through duplicate().
use vigil_kernel::{Encoding, Frame};

fn main() {
    let frame = Frame::new(0, 2, 2, 85, Encoding::Rgb24, vec![0; 12]);
    let _copy = frame.clone();
}
