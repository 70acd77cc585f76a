//! Conversion from the internal accumulation representation to bus output.

use rand::rngs::StdRng;

use super::MixSample;

/// Destination of a conversion, borrowed from a main bus.
#[derive(Debug)]
pub enum OutputSlice<'a> {
    Pcm16(&'a mut [i16]),
    Float(&'a mut [f32]),
}

impl OutputSlice<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Pcm16(out) => out.len(),
            Self::Float(out) => out.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Convert `input` into `output`, sample for sample.
///
/// Wide integer input is dithered before it is narrowed to 16 bits; float
/// input is rounded and clamped. Only `min(input.len(), output.len())`
/// samples are written.
pub fn convert_mixer_format<S: MixSample>(input: &[S], output: OutputSlice<'_>, rng: &mut StdRng) {
    match output {
        OutputSlice::Pcm16(out) => {
            for (dst, &src) in out.iter_mut().zip(input) {
                *dst = src.to_pcm16(rng);
            }
        }
        OutputSlice::Float(out) => {
            for (dst, &src) in out.iter_mut().zip(input) {
                *dst = src.to_unit();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn fixed_to_pcm16_round_trip_within_one_lsb() {
        let mut rng = StdRng::seed_from_u64(7);
        let input: Vec<i32> = (0..4096)
            .map(|_| rng.gen_range(-(1i32 << 27)..(1i32 << 27)))
            .collect();
        let mut narrow = vec![0i16; input.len()];
        convert_mixer_format(&input, OutputSlice::Pcm16(&mut narrow), &mut rng);

        for (&original, &quantized) in input.iter().zip(&narrow) {
            let widened = i32::from_pcm16(quantized);
            assert!((widened - original).abs() <= 1 << 12, "{} vs {}", original, widened);
        }
    }

    #[test]
    fn widened_pcm16_survives_conversion_exactly() {
        let mut rng = StdRng::seed_from_u64(3);
        let source: Vec<i16> = vec![i16::MIN, -300, -1, 0, 1, 300, i16::MAX];
        let widened: Vec<i32> = source.iter().map(|&s| i32::from_pcm16(s)).collect();
        let mut out = vec![0i16; source.len()];
        convert_mixer_format(&widened, OutputSlice::Pcm16(&mut out), &mut rng);
        assert_eq!(out, source);
    }

    #[test]
    fn float_to_float_is_a_copy() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = vec![0.5f32, -0.75, 1.5, 0.0];
        let mut first = vec![0.0f32; 4];
        convert_mixer_format(&input, OutputSlice::Float(&mut first), &mut rng);
        let mut second = vec![0.0f32; 4];
        convert_mixer_format(&first, OutputSlice::Float(&mut second), &mut rng);
        assert_eq!(first, input);
        assert_eq!(second, input);
    }

    #[test]
    fn float_to_pcm16_clamps_and_rounds() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = vec![0.5f32, -1.5, 1.5, 1.0 / 65536.0 * 3.0];
        let mut out = vec![0i16; 4];
        convert_mixer_format(&input, OutputSlice::Pcm16(&mut out), &mut rng);
        assert_eq!(out, vec![16384, i16::MIN, i16::MAX, 2]);
    }

    #[test]
    fn fixed_to_float_rescales() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = vec![1i32 << 26, -(1i32 << 27)];
        let mut out = vec![0.0f32; 2];
        convert_mixer_format(&input, OutputSlice::Float(&mut out), &mut rng);
        assert_eq!(out, vec![0.5, -1.0]);
    }
}
