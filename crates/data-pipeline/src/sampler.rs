//! Bucketing-сэмплер: детерминированные, возобновляемые батчи
//! с миксованием нескольких корпусов в фиксированных долях.
//!
//! Корпуса должны быть отсортированы по длительности при загрузке:
//! чанк объединяет записи близкой длительности, что сокращает паддинг.

use data_core::{DataError, DataResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Сериализуемое состояние сэмплера для чекпоинтов.
///
/// `shuffled == None` в загружаемом состоянии (старые чекпоинты)
/// оставляет текущий порядок батчей.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerState {
    /// Номер эпохи (он же seed перемешивания).
    pub epoch: u64,

    /// Индекс следующего батча внутри эпохи.
    pub batch_idx: usize,

    /// Перемешанный список батчей глобальных индексов.
    #[serde(default)]
    pub shuffled: Option<Vec<Vec<usize>>>,
}

/// Генератор батчей глобальных индексов датасета.
pub struct BucketingSampler {
    corpus_lens: Vec<usize>,
    batch_size: usize,
    mixing: Vec<f64>,
    epoch: u64,
    batch_idx: usize,
    shuffled: Vec<Vec<usize>>,
}

impl BucketingSampler {
    /// Создать сэмплер и перемешать эпоху 0.
    ///
    /// `mixing` — доли корпусов в батче; по умолчанию равные.
    /// Переподписка (доля требует больше индексов, чем дает чанк корпуса)
    /// — ошибка конфигурации, а не молчаливое усечение.
    pub fn new(
        corpus_lens: &[usize],
        batch_size: usize,
        mixing: Option<Vec<f64>>,
    ) -> DataResult<Self> {
        if corpus_lens.is_empty() {
            return Err(DataError::Sampler("нет ни одного корпуса".to_string()));
        }
        if batch_size == 0 {
            return Err(DataError::Sampler("batch_size должен быть > 0".to_string()));
        }
        let mixing = match mixing {
            Some(mixing) => {
                if mixing.len() != corpus_lens.len() {
                    return Err(DataError::Sampler(format!(
                        "mixing задает {} долей при {} корпусах",
                        mixing.len(),
                        corpus_lens.len()
                    )));
                }
                mixing
            }
            None => vec![1.0 / corpus_lens.len() as f64; corpus_lens.len()],
        };

        let mut sampler = Self {
            corpus_lens: corpus_lens.to_vec(),
            batch_size,
            mixing,
            epoch: 0,
            batch_idx: 0,
            shuffled: Vec::new(),
        };
        sampler.shuffle(0, 0)?;
        Ok(sampler)
    }

    /// Количество батчей в эпохе.
    pub fn num_batches(&self) -> usize {
        self.shuffled.len()
    }

    /// Текущая эпоха.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Перемешать батчи для эпохи.
    ///
    /// Полностью детерминировано: два вызова с одной эпохой дают
    /// идентичный порядок и состав батчей.
    pub fn shuffle(&mut self, epoch: u64, batch_idx: usize) -> DataResult<()> {
        self.epoch = epoch;
        self.batch_idx = batch_idx;

        let mut rng = StdRng::seed_from_u64(epoch);

        // Число батчей диктует первый (основной) корпус.
        let num_batches =
            (self.corpus_lens[0] as f64 / self.batch_size as f64).round() as usize;
        if num_batches == 0 {
            return Err(DataError::Sampler(format!(
                "основной корпус ({} записей) меньше половины batch_size ({})",
                self.corpus_lens[0], self.batch_size
            )));
        }

        let take: Vec<usize> = self
            .mixing
            .iter()
            .map(|m| (m * self.batch_size as f64) as usize)
            .collect();

        // Контроль переподписки до какого-либо перемешивания.
        for (k, (&len, &take_k)) in self.corpus_lens.iter().zip(&take).enumerate() {
            let chunk_len = len / num_batches;
            if take_k > chunk_len {
                return Err(DataError::Sampler(format!(
                    "корпус {k}: доля требует {take_k} индексов на батч, а чанк содержит {chunk_len} \
                     (уменьшите batch_size или долю в mixing)"
                )));
            }
        }

        // Смещения корпусов в глобальной нумерации.
        let mut offsets = Vec::with_capacity(self.corpus_lens.len());
        let mut offset = 0;
        for &len in &self.corpus_lens {
            offsets.push(offset);
            offset += len;
        }

        let mut batches: Vec<Vec<usize>> = Vec::with_capacity(num_batches);
        for b in 0..num_batches {
            let mut batch = Vec::with_capacity(take.iter().sum());
            for (k, &len) in self.corpus_lens.iter().enumerate() {
                let chunk_len = len / num_batches;
                let start = offsets[k] + b * chunk_len;
                let mut chunk: Vec<usize> = (start..start + chunk_len).collect();
                chunk.shuffle(&mut rng);
                batch.extend_from_slice(&chunk[..take[k]]);
            }
            batches.push(batch);
        }

        batches.shuffle(&mut rng);
        self.shuffled = batches;
        Ok(())
    }

    /// Следующий батч эпохи; `None` — эпоха исчерпана.
    pub fn next_batch(&mut self) -> Option<Vec<usize>> {
        let batch = self.shuffled.get(self.batch_idx)?.clone();
        self.batch_idx += 1;
        Some(batch)
    }

    /// Итератор по оставшимся батчам эпохи.
    ///
    /// Индекс батча продвигается при каждом yield: чекпоинт посреди
    /// эпохи возобновится ровно со следующего батча.
    pub fn iter(&mut self) -> BatchIter<'_> {
        BatchIter { sampler: self }
    }

    /// Снять состояние для чекпоинта.
    pub fn state_dict(&self) -> SamplerState {
        SamplerState {
            epoch: self.epoch,
            batch_idx: self.batch_idx,
            shuffled: Some(self.shuffled.clone()),
        }
    }

    /// Восстановить состояние из чекпоинта.
    pub fn load_state_dict(&mut self, state: SamplerState) {
        self.epoch = state.epoch;
        self.batch_idx = state.batch_idx;
        if let Some(shuffled) = state.shuffled {
            self.shuffled = shuffled;
        }
    }
}

/// Итератор по оставшимся батчам одной эпохи.
pub struct BatchIter<'a> {
    sampler: &'a mut BucketingSampler,
}

impl Iterator for BatchIter<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        self.sampler.next_batch()
    }
}
