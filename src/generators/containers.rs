//! Generators for lists, sets, maps, and arrays.
//!
//! Container size scales with the complexity level while element complexity
//! passes through, so a level-1 list holds level-1 elements. Nested arrays
//! split the level randomly between the outer dimension and everything
//! below it, and a top-level random array is never empty so that element
//! handling is always exercised.

use crate::complexity::Complexity;
use crate::error::ConfigError;
use crate::generators::{generator_for, GeneratorSetup, ValueGen};
use crate::rng::RecordingRng;
use crate::value::{Value, ValueType};

fn dedup(values: Vec<Value>) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        if !result.contains(&value) {
            result.push(value);
        }
    }
    result
}

pub struct ListGen {
    component: Box<dyn ValueGen>,
}

impl ListGen {
    pub fn new(component: Box<dyn ValueGen>) -> ListGen {
        ListGen { component }
    }
}

impl ValueGen for ListGen {
    fn simple(&self) -> Vec<Value> {
        vec![Value::List(Vec::new()), Value::List(self.component.simple())]
    }

    fn edge(&self) -> Vec<Value> {
        vec![Value::Null]
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        let size = rng.gen_index((complexity.level() as usize * 2).max(2));
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            items.push(self.component.random(complexity, rng)?);
        }
        Ok(Value::List(items))
    }
}

pub struct SetGen {
    component: Box<dyn ValueGen>,
}

impl SetGen {
    pub fn new(component: Box<dyn ValueGen>) -> SetGen {
        SetGen { component }
    }
}

impl ValueGen for SetGen {
    fn simple(&self) -> Vec<Value> {
        vec![
            Value::SetOf(Vec::new()),
            Value::SetOf(dedup(self.component.simple())),
        ]
    }

    fn edge(&self) -> Vec<Value> {
        vec![Value::Null]
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        let attempts = rng.gen_index(complexity.level() as usize * 2).max(2);
        let mut items: Vec<Value> = Vec::new();
        for _ in 0..attempts {
            let item = self.component.random(complexity, rng)?;
            if !items.contains(&item) {
                items.push(item);
            }
        }
        Ok(Value::SetOf(items))
    }
}

pub struct MapGen {
    key: Box<dyn ValueGen>,
    value: Box<dyn ValueGen>,
}

impl MapGen {
    pub fn new(key: Box<dyn ValueGen>, value: Box<dyn ValueGen>) -> MapGen {
        MapGen { key, value }
    }
}

impl ValueGen for MapGen {
    fn simple(&self) -> Vec<Value> {
        let keys = dedup(self.key.simple());
        let values = dedup(self.value.simple());
        let mut maps = vec![Value::MapOf(Vec::new())];
        if let (Some(first_key), Some(first_value)) = (keys.first(), values.first()) {
            maps.push(Value::MapOf(vec![(first_key.clone(), first_value.clone())]));
            let zipped: Vec<(Value, Value)> = keys
                .iter()
                .enumerate()
                .map(|(index, key)| (key.clone(), values[index % values.len()].clone()))
                .collect();
            maps.push(Value::MapOf(zipped));
            if keys.len() > 1 {
                maps.push(Value::MapOf(vec![
                    (keys[0].clone(), first_value.clone()),
                    (keys[1].clone(), first_value.clone()),
                ]));
            }
        }
        dedup(maps)
    }

    fn edge(&self) -> Vec<Value> {
        vec![Value::Null]
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        let size = rng.gen_index((complexity.level() as usize * 2).max(2));
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for _ in 0..size {
            let key = self.key.random(complexity, rng)?;
            let value = self.value.random(complexity, rng)?;
            if let Some(existing) = entries.iter_mut().find(|(k, _)| *k == key) {
                existing.1 = value;
            } else {
                entries.push((key, value));
            }
        }
        Ok(Value::MapOf(entries))
    }
}

enum ArrayComponent {
    Leaf(Box<dyn ValueGen>),
    Nested(Box<ArrayGen>),
}

pub struct ArrayGen {
    component: ArrayComponent,
}

impl ArrayGen {
    pub(crate) fn build(
        element: &ValueType,
        setup: &GeneratorSetup<'_>,
        rng: &RecordingRng,
    ) -> Result<ArrayGen, ConfigError> {
        let component = match element {
            ValueType::Array(inner) => {
                ArrayComponent::Nested(Box::new(ArrayGen::build(inner, setup, rng)?))
            }
            other => ArrayComponent::Leaf(generator_for(other, setup, rng)?),
        };
        Ok(ArrayGen { component })
    }

    fn component_simple(&self) -> Vec<Value> {
        match &self.component {
            ArrayComponent::Leaf(generator) => generator.simple(),
            ArrayComponent::Nested(nested) => nested.simple(),
        }
    }

    fn random_nested(
        &self,
        complexity: Complexity,
        component_complexity: Complexity,
        top: bool,
        rng: &RecordingRng,
    ) -> Result<Value, ConfigError> {
        // For multidimensional arrays, split the level randomly between
        // this dimension and the ones below it.
        let (current, remainder) = match &self.component {
            ArrayComponent::Nested(_) => {
                let level = complexity.level();
                let current_level = if level == 0 {
                    0
                } else {
                    rng.gen_index(level as usize) as u8
                };
                (
                    Complexity::new(current_level),
                    Some(Complexity::new(level - current_level)),
                )
            }
            ArrayComponent::Leaf(_) => (complexity, None),
        };
        let mut size = rng.gen_index((current.level() as usize * 2).max(2));
        if top && size == 0 {
            size = 1;
        }
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            let item = match &self.component {
                ArrayComponent::Nested(nested) => nested.random_nested(
                    remainder.unwrap_or(Complexity::ZERO),
                    component_complexity,
                    false,
                    rng,
                )?,
                ArrayComponent::Leaf(generator) => {
                    generator.random(component_complexity, rng)?
                }
            };
            items.push(item);
        }
        Ok(Value::Array(items))
    }
}

impl ValueGen for ArrayGen {
    fn simple(&self) -> Vec<Value> {
        vec![
            Value::Array(Vec::new()),
            Value::Array(self.component_simple()),
        ]
    }

    fn edge(&self) -> Vec<Value> {
        vec![Value::Null]
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        self.random_nested(complexity, complexity, true, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::TypeOverrides;

    fn generator(ty: ValueType) -> Box<dyn ValueGen> {
        let overrides = TypeOverrides::default();
        let setup = GeneratorSetup {
            overrides: &overrides,
            receiver_pool: None,
        };
        let rng = RecordingRng::with_seed(0);
        generator_for(&ty, &setup, &rng).unwrap()
    }

    #[test]
    fn list_simple_covers_empty_and_component_simples() {
        let list = generator(ValueType::List(Box::new(ValueType::Int)));
        let simple = list.simple();
        assert_eq!(simple[0], Value::List(Vec::new()));
        assert_eq!(
            simple[1],
            Value::List(vec![Value::Int(-1), Value::Int(0), Value::Int(1)])
        );
        assert_eq!(list.edge(), vec![Value::Null]);
    }

    #[test]
    fn list_elements_follow_the_component_type() {
        let list = generator(ValueType::List(Box::new(ValueType::Str)));
        let rng = RecordingRng::with_seed(17);
        for _ in 0..50 {
            match list.random(Complexity::new(3), &rng).unwrap() {
                Value::List(items) => {
                    assert!(items.iter().all(|item| matches!(item, Value::Str(_))));
                    assert!(items.len() <= 6);
                }
                other => panic!("expected a list, got {other}"),
            }
        }
    }

    #[test]
    fn set_elements_are_distinct() {
        let set = generator(ValueType::SetOf(Box::new(ValueType::Int)));
        let rng = RecordingRng::with_seed(21);
        for _ in 0..50 {
            match set.random(Complexity::new(4), &rng).unwrap() {
                Value::SetOf(items) => {
                    for (index, item) in items.iter().enumerate() {
                        assert!(!items[index + 1..].contains(item));
                    }
                }
                other => panic!("expected a set, got {other}"),
            }
        }
    }

    #[test]
    fn map_keys_are_unique() {
        let map = generator(ValueType::MapOf(
            Box::new(ValueType::Str),
            Box::new(ValueType::Int),
        ));
        let rng = RecordingRng::with_seed(23);
        for _ in 0..50 {
            match map.random(Complexity::new(4), &rng).unwrap() {
                Value::MapOf(entries) => {
                    for (index, (key, _)) in entries.iter().enumerate() {
                        assert!(entries[index + 1..].iter().all(|(other, _)| other != key));
                    }
                }
                other => panic!("expected a map, got {other}"),
            }
        }
    }

    #[test]
    fn top_level_random_array_is_never_empty() {
        let array = generator(ValueType::Array(Box::new(ValueType::Int)));
        let rng = RecordingRng::with_seed(29);
        for _ in 0..200 {
            match array.random(Complexity::new(1), &rng).unwrap() {
                Value::Array(items) => assert!(!items.is_empty()),
                other => panic!("expected an array, got {other}"),
            }
        }
    }

    #[test]
    fn nested_arrays_stay_rectangular_in_type() {
        let array = generator(ValueType::Array(Box::new(ValueType::Array(Box::new(
            ValueType::Int,
        )))));
        let rng = RecordingRng::with_seed(31);
        for _ in 0..100 {
            match array.random(Complexity::new(5), &rng).unwrap() {
                Value::Array(rows) => {
                    for row in rows {
                        assert!(matches!(row, Value::Array(_)));
                    }
                }
                other => panic!("expected an array, got {other}"),
            }
        }
    }
}
