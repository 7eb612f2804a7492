//! Generators for primitive values and strings.
//!
//! Numeric random generation draws from a window centered at zero whose
//! width grows exponentially with the complexity level: `2^level` for
//! bytes, `4^level` for shorts, `8^level` for ints, and `16^level` for
//! longs. Small levels therefore exercise the values where off-by-one
//! defects live, and high levels reach the full range of each width.

use crate::complexity::Complexity;
use crate::error::ConfigError;
use crate::generators::ValueGen;
use crate::rng::RecordingRng;
use crate::value::Value;

pub(crate) fn alphanumeric_chars() -> Vec<char> {
    ('a'..='z')
        .chain('A'..='Z')
        .chain('0'..='9')
        .chain(std::iter::once(' '))
        .collect()
}

/// Draws from `[-power / 2, power / 2)`.
fn random_magnitude(power: i64, rng: &RecordingRng) -> i64 {
    rng.gen_i64_below(power) - power / 2
}

pub struct ByteGen;

impl ByteGen {
    pub fn random_byte(complexity: Complexity, rng: &RecordingRng) -> i8 {
        random_magnitude(complexity.power(2), rng) as i8
    }
}

impl ValueGen for ByteGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::Byte(-1), Value::Byte(0), Value::Byte(1)]
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        Ok(Value::Byte(Self::random_byte(complexity, rng)))
    }
}

pub struct ShortGen;

impl ShortGen {
    pub fn random_short(complexity: Complexity, rng: &RecordingRng) -> i16 {
        random_magnitude(complexity.power(4), rng) as i16
    }
}

impl ValueGen for ShortGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::Short(-1), Value::Short(0), Value::Short(1)]
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        Ok(Value::Short(Self::random_short(complexity, rng)))
    }
}

pub struct IntGen;

impl IntGen {
    pub fn random_int(complexity: Complexity, rng: &RecordingRng) -> i32 {
        random_magnitude(complexity.power(8), rng) as i32
    }
}

impl ValueGen for IntGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::Int(-1), Value::Int(0), Value::Int(1)]
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        Ok(Value::Int(Self::random_int(complexity, rng)))
    }
}

pub struct LongGen;

impl LongGen {
    pub fn random_long(complexity: Complexity, rng: &RecordingRng) -> i64 {
        random_magnitude(complexity.power(16), rng)
    }
}

impl ValueGen for LongGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::Long(-1), Value::Long(0), Value::Long(1)]
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        Ok(Value::Long(Self::random_long(complexity, rng)))
    }
}

pub struct FloatGen;

impl FloatGen {
    pub fn random_float(complexity: Complexity, rng: &RecordingRng) -> f32 {
        IntGen::random_int(complexity, rng) as f32 * rng.gen_f32()
    }
}

impl ValueGen for FloatGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::Float(-0.1), Value::Float(0.0), Value::Float(0.1)]
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        Ok(Value::Float(Self::random_float(complexity, rng)))
    }
}

pub struct DoubleGen;

impl DoubleGen {
    pub fn random_double(complexity: Complexity, rng: &RecordingRng) -> f64 {
        FloatGen::random_float(complexity, rng) as f64 * rng.gen_f64()
    }
}

impl ValueGen for DoubleGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::Double(-0.1), Value::Double(0.0), Value::Double(0.1)]
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        Ok(Value::Double(Self::random_double(complexity, rng)))
    }
}

pub struct BooleanGen;

impl ValueGen for BooleanGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::Boolean(true), Value::Boolean(false)]
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, _complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        Ok(Value::Boolean(rng.gen_bool()))
    }
}

pub struct CharGen;

impl ValueGen for CharGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::Char('A'), Value::Char('0')]
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, _complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        let alphabet = alphanumeric_chars();
        Ok(Value::Char(alphabet[rng.gen_index(alphabet.len())]))
    }
}

pub struct StringGen;

impl StringGen {
    pub fn random_string(complexity: Complexity, rng: &RecordingRng) -> String {
        let alphabet = alphanumeric_chars();
        let length = rng.gen_index(complexity.level() as usize * 2 + 1);
        (0..length)
            .map(|_| alphabet[rng.gen_index(alphabet.len())])
            .collect()
    }
}

impl ValueGen for StringGen {
    fn simple(&self) -> Vec<Value> {
        vec![
            Value::Str("t".into()),
            Value::Str("gwa".into()),
            Value::Str("8 circle".into()),
            Value::Str(String::new()),
        ]
    }

    fn edge(&self) -> Vec<Value> {
        vec![Value::Null]
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        Ok(Value::Str(Self::random_string(complexity, rng)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_magnitude_tracks_the_dial() {
        let rng = RecordingRng::with_seed(5);
        for _ in 0..500 {
            let small = ByteGen::random_byte(Complexity::new(1), &rng);
            assert!((-1..=0).contains(&small));
        }
        for _ in 0..500 {
            // Full width at the top of the dial.
            let _wide: i8 = ByteGen::random_byte(Complexity::new(8), &rng);
        }
    }

    #[test]
    fn int_window_is_centered_at_zero() {
        let rng = RecordingRng::with_seed(6);
        let complexity = Complexity::new(4);
        let half = complexity.power(8) / 2;
        for _ in 0..1000 {
            let value = IntGen::random_int(complexity, &rng) as i64;
            assert!((-half..half).contains(&value));
        }
    }

    #[test]
    fn long_window_grows_beyond_int_range_at_high_levels() {
        let rng = RecordingRng::with_seed(7);
        let complexity = Complexity::new(8);
        let mut saw_beyond_int = false;
        for _ in 0..10_000 {
            let value = LongGen::random_long(complexity, &rng);
            if value.abs() > i32::MAX as i64 / 8 {
                saw_beyond_int = true;
            }
        }
        assert!(saw_beyond_int);
    }

    #[test]
    fn string_length_is_bounded_by_the_dial() {
        let rng = RecordingRng::with_seed(8);
        for level in 1..=8_u8 {
            for _ in 0..100 {
                let text = StringGen::random_string(Complexity::new(level), &rng);
                assert!(text.chars().count() <= level as usize * 2);
                assert!(text.chars().all(|c| c.is_ascii_alphanumeric() || c == ' '));
            }
        }
    }

    #[test]
    fn simple_sets_are_the_expected_anchors() {
        assert_eq!(
            IntGen.simple(),
            vec![Value::Int(-1), Value::Int(0), Value::Int(1)]
        );
        assert_eq!(StringGen.simple().len(), 4);
        assert_eq!(BooleanGen.simple().len(), 2);
        assert_eq!(StringGen.edge(), vec![Value::Null]);
        assert!(IntGen.edge().is_empty());
    }
}
