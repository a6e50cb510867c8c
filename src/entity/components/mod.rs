pub mod objects;
pub mod rendering;
