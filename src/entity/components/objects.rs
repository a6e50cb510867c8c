use glam::Affine3A;

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Transform(pub Affine3A);
