use super::mesh::PosColorVertex;

pub const CUBE_VERTICES: &[PosColorVertex] = &[
    PosColorVertex::new(-1.0, 1.0, 1.0, 0xff000000),
    PosColorVertex::new(1.0, 1.0, 1.0, 0xff0000ff),
    PosColorVertex::new(-1.0, -1.0, 1.0, 0xff00ff00),
    PosColorVertex::new(1.0, -1.0, 1.0, 0xff00ffff),
    PosColorVertex::new(-1.0, 1.0, -1.0, 0xffff0000),
    PosColorVertex::new(1.0, 1.0, -1.0, 0xffff00ff),
    PosColorVertex::new(-1.0, -1.0, -1.0, 0xffffff00),
    PosColorVertex::new(1.0, -1.0, -1.0, 0xffffffff),
];

#[rustfmt::skip]
pub const CUBE_TRI_LIST: &[u32] = &[
    // Front
    2, 1, 0,
    2, 3, 1,
    // Back
    5, 6, 4,
    7, 6, 5,
    // Left
    4, 2, 0,
    6, 2, 4,
    // Right
    3, 5, 1,
    3, 7, 5,
    // Top
    1, 4, 0,
    1, 5, 4,
    // Bottom
    6, 3, 2,
    7, 3, 6,
];
