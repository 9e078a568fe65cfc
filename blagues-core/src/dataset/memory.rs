use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{overwrite_item, push_item, Dataset, DatasetError};
use crate::joke::{Joke, JokeId, JokePayload};

/// Dataset held in memory. Used by tests and for offline checks.
#[derive(Default)]
pub struct InMemoryDataset {
    items: RwLock<Vec<Joke>>,
}

impl InMemoryDataset {
    pub fn new(items: Vec<Joke>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }
}

#[async_trait]
impl Dataset for InMemoryDataset {
    async fn append_item(&self, payload: JokePayload) -> Result<Joke, DatasetError> {
        Ok(push_item(&mut *self.items.write().await, payload))
    }

    async fn replace_item(&self, id: JokeId, payload: JokePayload) -> Result<Joke, DatasetError> {
        overwrite_item(&mut self.items.write().await, id, payload)
    }

    async fn all_items(&self) -> Result<Vec<Joke>, DatasetError> {
        Ok(self.items.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joke::Category;

    #[tokio::test]
    async fn test_lookups() {
        let dataset = InMemoryDataset::new(vec![Joke {
            id: JokeId(1),
            category: Category::Global,
            question: "Pourquoi ?".to_string(),
            answer: "Parce que.".to_string(),
        }]);

        let appended = dataset
            .append_item(JokePayload::parse("dev", "Q", "A").unwrap())
            .await
            .unwrap();
        assert_eq!(appended.id, JokeId(2));
        assert_eq!(dataset.count().await.unwrap(), 2);

        let found = dataset.find_by_question("  pourquoi ? ").await.unwrap();
        assert_eq!(found.map(|j| j.id), Some(JokeId(1)));
        assert!(dataset.find_by_id(JokeId(3)).await.unwrap().is_none());
    }
}
