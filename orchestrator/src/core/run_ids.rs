//! Run identifier generation for dispatched intents.

use rand::{Rng, distributions::Alphanumeric};

/// Source of fresh, unique run identifiers.
pub trait RunIdGenerator {
    fn next_run_id(&mut self) -> String;
}

/// Production generator: `run-` followed by 12 lowercase alphanumerics.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRunIds;

impl RunIdGenerator for RandomRunIds {
    fn next_run_id(&mut self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = std::iter::repeat_with(|| rng.sample(Alphanumeric))
            .map(char::from)
            .take(12)
            .collect::<String>()
            .to_lowercase();
        format!("run-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_have_stable_shape() {
        let mut ids = RandomRunIds;
        let first = ids.next_run_id();
        let second = ids.next_run_id();
        assert!(first.starts_with("run-"));
        assert_eq!(first.len(), 16);
        assert_ne!(first, second);
    }
}
