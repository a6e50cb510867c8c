use crate::rendering::blend_shapes::{BlendShape, BlendShapeSet};

/// Computes the contribution of every frame of `shape` for the shape weight `weight` and appends them to `out`.
///
/// Each frame contributes in a tent around its own weight: it ramps up from the previous frame's weight (or zero
/// for the first frame) and ramps down towards the next frame's weight. Between two neighboring frames the two
/// factors add up to one, all other frames are zero. Weights beyond the last frame are extrapolated from the last
/// two frames (or from zero for single frame shapes), nothing is clamped.
pub fn append_frame_factors(shape: &BlendShape, weight: f32, out: &mut Vec<f32>) {
    let frames = &shape.frames;
    for (index, frame) in frames.iter().enumerate() {
        let is_last = index + 1 == frames.len();
        let factor = if weight <= frame.weight || is_last {
            if index == 0 {
                weight / frame.weight
            } else {
                let previous = frames[index - 1].weight;
                if weight >= previous {
                    (weight - previous) / (frame.weight - previous)
                } else {
                    0.0
                }
            }
        } else {
            let next = frames[index + 1].weight;
            if weight <= next {
                (next - weight) / (next - frame.weight)
            } else {
                0.0
            }
        };

        out.push(factor);
    }
}

/// Fills `out` with one factor per frame of all shapes (shape major), ready to be consumed by the deformation
/// kernels. Shapes without a weight in `weights` use zero.
pub fn compute_frame_weights(shapes: &BlendShapeSet, weights: &[f32], out: &mut Vec<f32>) {
    profiling::scope!("compute_frame_weights");
    out.clear();
    out.reserve(shapes.frame_count());

    for (shape_index, shape) in shapes.shapes.iter().enumerate() {
        let weight = weights.get(shape_index).copied().unwrap_or(0.0);
        append_frame_factors(shape, weight, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::blend_shapes::BlendShapeFrame;
    use rand::Rng;

    fn shape(weights: &[f32]) -> BlendShape {
        BlendShape {
            name: "shape".to_string(),
            frames: weights
                .iter()
                .map(|&weight| BlendShapeFrame {
                    weight,
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn factors(shape: &BlendShape, weight: f32) -> Vec<f32> {
        let mut out = Vec::new();
        append_frame_factors(shape, weight, &mut out);
        out
    }

    #[test]
    pub fn two_frames_at_half_and_full() {
        let shape = shape(&[0.5, 1.0]);
        assert_eq!(factors(&shape, 0.25), vec![0.5, 0.0]);
        assert_eq!(factors(&shape, 0.75), vec![0.5, 0.5]);
        assert_eq!(factors(&shape, 0.5), vec![1.0, 0.0]);
        assert_eq!(factors(&shape, 1.0), vec![0.0, 1.0]);
        assert_eq!(factors(&shape, 0.0), vec![0.0, 0.0]);
    }

    #[test]
    pub fn single_frame_is_linear() {
        let shape = shape(&[100.0]);
        assert_eq!(factors(&shape, 25.0), vec![0.25]);
        assert_eq!(factors(&shape, 100.0), vec![1.0]);
    }

    #[test]
    pub fn weights_beyond_the_last_frame_extrapolate() {
        assert_eq!(factors(&shape(&[100.0]), 200.0), vec![2.0]);
        assert_eq!(factors(&shape(&[0.5, 1.0]), 1.5), vec![0.0, 2.0]);
        assert_eq!(factors(&shape(&[0.25, 0.5, 1.0]), 2.0), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    pub fn negative_weights_extrapolate_the_first_frame() {
        assert_eq!(factors(&shape(&[0.5, 1.0]), -0.25), vec![-0.5, 0.0]);
    }

    #[test]
    pub fn neighbors_form_a_partition_of_unity() {
        let frame_weights = [0.1, 0.35, 0.4, 0.8, 1.0];
        let shape = shape(&frame_weights);
        let mut rng = rand::rng();

        for _ in 0..1000 {
            let weight: f32 = rng.random_range(0.1..1.0);
            let upper = frame_weights
                .iter()
                .position(|&frame_weight| weight <= frame_weight)
                .expect("weight is within the frame range");
            let factors = factors(&shape, weight);

            for (index, factor) in factors.iter().enumerate() {
                if index != upper && index + 1 != upper {
                    assert_eq!(*factor, 0.0, "frame {} at weight {}", index, weight);
                }
            }

            let sum = factors[upper] + if upper > 0 { factors[upper - 1] } else { 0.0 };
            if upper > 0 {
                assert!((sum - 1.0).abs() < 1e-5, "sum {} at weight {}", sum, weight);
            }
        }
    }

    #[test]
    pub fn missing_weights_are_zero() {
        let set = BlendShapeSet {
            shapes: vec![shape(&[0.5, 1.0]), shape(&[1.0])],
        };

        let mut out = vec![42.0];
        compute_frame_weights(&set, &[0.75], &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);
    }
}
