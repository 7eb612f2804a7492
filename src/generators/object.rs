//! Generators for fully generic parameters and tracked receivers.

use std::cell::RefCell;
use std::rc::Rc;

use crate::complexity::Complexity;
use crate::error::ConfigError;
use crate::generators::{
    BooleanGen, ByteGen, CharGen, DoubleGen, FloatGen, IntGen, LongGen, ShortGen, StringGen,
    ValueGen,
};
use crate::rng::RecordingRng;
use crate::value::Value;

const SIMPLE_LIMIT: usize = 8;
const EDGE_LIMIT: usize = 8;

/// Draws previously created receivers for receiver-typed parameters.
///
/// The pool is shared with the sequencing loop, which appends each tracked
/// receiver as it becomes ready.
pub struct ReceiverGen {
    pool: Rc<RefCell<Vec<usize>>>,
}

impl ReceiverGen {
    pub(crate) fn new(pool: Rc<RefCell<Vec<usize>>>) -> ReceiverGen {
        ReceiverGen { pool }
    }
}

impl ValueGen for ReceiverGen {
    fn simple(&self) -> Vec<Value> {
        Vec::new()
    }

    fn edge(&self) -> Vec<Value> {
        Vec::new()
    }

    fn random(&self, _complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        let pool = self.pool.borrow();
        if pool.is_empty() {
            return Err(ConfigError::NoReceiverAvailable);
        }
        Ok(Value::Receiver(pool[rng.gen_index(pool.len())]))
    }
}

/// Generator for fully generic parameters.
///
/// Mixes an opaque token, the default generators for every concrete type,
/// and, when receivers exist, the receiver pool.
pub struct AnyGen {
    token: i32,
    receiver: Option<ReceiverGen>,
    defaults: Vec<Box<dyn ValueGen>>,
}

impl AnyGen {
    pub(crate) fn new(receiver: Option<ReceiverGen>, rng: &RecordingRng) -> AnyGen {
        AnyGen {
            token: rng.next_u32() as i32,
            receiver,
            defaults: vec![
                Box::new(ByteGen),
                Box::new(ShortGen),
                Box::new(IntGen),
                Box::new(LongGen),
                Box::new(FloatGen),
                Box::new(DoubleGen),
                Box::new(CharGen),
                Box::new(BooleanGen),
                Box::new(StringGen),
            ],
        }
    }

    fn collected(&self, tier: impl Fn(&dyn ValueGen) -> Vec<Value>, limit: usize) -> Vec<Value> {
        let mut values = Vec::new();
        for generator in &self.defaults {
            for value in tier(generator.as_ref()) {
                if !values.contains(&value) {
                    values.push(value);
                }
                if values.len() == limit {
                    return values;
                }
            }
        }
        values
    }
}

impl ValueGen for AnyGen {
    fn simple(&self) -> Vec<Value> {
        let mut values = vec![Value::Token(self.token)];
        if let Some(receiver) = &self.receiver {
            values.extend(receiver.simple());
        }
        values.extend(self.collected(|g| g.simple(), SIMPLE_LIMIT));
        values
    }

    fn edge(&self) -> Vec<Value> {
        let mut values = vec![Value::Null];
        if let Some(receiver) = &self.receiver {
            values.extend(receiver.edge());
        }
        for value in self.collected(|g| g.edge(), EDGE_LIMIT) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        if let Some(receiver) = &self.receiver {
            if rng.gen_bool() {
                let simple = receiver.simple();
                if rng.gen_bool() && !simple.is_empty() {
                    return Ok(simple[rng.gen_index(simple.len())].clone());
                }
                return receiver.random(complexity, rng);
            }
        }
        let generator = &self.defaults[rng.gen_index(self.defaults.len())];
        generator.random(complexity, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_generator_draws_from_the_shared_pool() {
        let pool = Rc::new(RefCell::new(vec![0, 2, 5]));
        let generator = ReceiverGen::new(pool.clone());
        let rng = RecordingRng::with_seed(1);
        for _ in 0..50 {
            match generator.random(Complexity::default(), &rng).unwrap() {
                Value::Receiver(index) => assert!(pool.borrow().contains(&index)),
                other => panic!("expected a receiver, got {other}"),
            }
        }
    }

    #[test]
    fn empty_receiver_pool_is_an_error() {
        let generator = ReceiverGen::new(Rc::new(RefCell::new(Vec::new())));
        let rng = RecordingRng::with_seed(1);
        assert!(matches!(
            generator.random(Complexity::default(), &rng),
            Err(ConfigError::NoReceiverAvailable)
        ));
    }

    #[test]
    fn any_simple_tier_starts_with_an_opaque_token_and_is_capped() {
        let rng = RecordingRng::with_seed(2);
        let generator = AnyGen::new(None, &rng);
        let simple = generator.simple();
        assert!(matches!(simple[0], Value::Token(_)));
        assert!(simple.len() <= 1 + SIMPLE_LIMIT);
        assert_eq!(generator.edge()[0], Value::Null);
    }

    #[test]
    fn any_random_mixes_receivers_when_available() {
        let pool = Rc::new(RefCell::new(vec![3]));
        let rng = RecordingRng::with_seed(4);
        let generator = AnyGen::new(Some(ReceiverGen::new(pool)), &rng);
        let mut saw_receiver = false;
        let mut saw_other = false;
        for _ in 0..200 {
            match generator.random(Complexity::default(), &rng).unwrap() {
                Value::Receiver(3) => saw_receiver = true,
                _ => saw_other = true,
            }
        }
        assert!(saw_receiver);
        assert!(saw_other);
    }
}
