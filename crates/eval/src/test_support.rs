use std::collections::BTreeMap;

use num_bigint::BigInt;

use crate::ConstantSource;

/// Named constants for evaluator tests.
#[derive(Debug, Default)]
pub(crate) struct Constants(BTreeMap<String, BigInt>);

impl Constants {
    pub(crate) fn with(mut self, name: &str, value: i64) -> Self {
        self.0.insert(name.to_string(), BigInt::from(value));
        self
    }
}

impl ConstantSource for Constants {
    fn constant(&self, name: &str) -> Option<BigInt> {
        self.0.get(name).cloned()
    }
}
