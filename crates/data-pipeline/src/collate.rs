//! Коллация элементов переменной длины в паддированный батч.
//!
//! Длины паддинга округляются вверх до кратного `pad_to` (по умолчанию
//! 128): формы тензоров стабилизируются, реаллокации на GPU реже.

use candle_core::{Device, Tensor};
use data_core::{DataError, DataResult};
use rand::rngs::StdRng;

use crate::dataset::{AudioTextDataset, DatasetItem};
use crate::sampler::BucketingSampler;

/// Гранулярность паддинга по умолчанию.
pub const DEFAULT_PAD_TO: usize = 128;

/// Паддированный батч.
#[derive(Debug)]
pub struct Batch {
    /// Имена корпусов-источников (сквозной проброс).
    pub dataset_names: Vec<String>,

    /// Пути к аудиофайлам (сквозной проброс).
    pub audio_paths: Vec<std::path::PathBuf>,

    /// Нормализованные эталоны (сквозной проброс).
    pub references: Vec<String>,

    /// Входные признаки [N, ..., T_pad], f32, нулевой паддинг.
    pub inputs: Tensor,

    /// Доля истинной длины входа: true_len / T_pad, [N] f32.
    pub input_length_fractions: Tensor,

    /// Целевые индексы [N, L, U_pad], u32 (L — число словарей).
    pub targets: Tensor,

    /// Истинные длины целей [N, L], u32.
    pub target_lengths: Tensor,
}

impl Batch {
    /// Размер батча.
    pub fn len(&self) -> usize {
        self.dataset_names.len()
    }

    /// Батч пуст (не бывает после успешной коллации).
    pub fn is_empty(&self) -> bool {
        self.dataset_names.is_empty()
    }
}

/// Следующее кратное `pad_to`, строго большее либо покрывающее `len`.
fn padded_len(len: usize, pad_to: usize) -> usize {
    (1 + len / pad_to) * pad_to
}

/// Склеить элементы в паддированный батч.
///
/// Максимум длины целей берется по ВСЕМ словарям сразу — у целевого
/// тензора одна общая временная ось.
pub fn collate(items: &[DatasetItem], pad_to: usize, device: &Device) -> DataResult<Batch> {
    if items.is_empty() {
        return Err(DataError::Collate("пустой список элементов".to_string()));
    }

    let num_codecs = items[0].targets.len();
    let lead_dims: Vec<usize> = {
        let dims = items[0].features.dims();
        dims[..dims.len() - 1].to_vec()
    };
    let lead: usize = lead_dims.iter().product();

    for item in items {
        if item.targets.len() != num_codecs {
            return Err(DataError::Collate(format!(
                "у {} {} целевых словарей вместо {num_codecs}",
                item.audio_path.display(),
                item.targets.len()
            )));
        }
        let dims = item.features.dims();
        if dims[..dims.len() - 1] != lead_dims[..] {
            return Err(DataError::Collate(format!(
                "несовместимая форма признаков {:?} у {}",
                dims,
                item.audio_path.display()
            )));
        }
    }

    let input_max = items
        .iter()
        .map(|item| item.features.dims().last().copied().unwrap_or(0))
        .max()
        .unwrap_or(0);
    let target_max = items
        .iter()
        .flat_map(|item| item.targets.iter().map(Vec::len))
        .max()
        .unwrap_or(0);
    let input_pad = padded_len(input_max, pad_to);
    let target_pad = padded_len(target_max, pad_to);

    let n = items.len();
    let mut inputs = vec![0.0_f32; n * lead * input_pad];
    let mut fractions = vec![0.0_f32; n];
    let mut targets = vec![0_u32; n * num_codecs * target_pad];
    let mut target_lengths = vec![0_u32; n * num_codecs];

    for (k, item) in items.iter().enumerate() {
        let t = item.features.dims().last().copied().unwrap_or(0);
        fractions[k] = t as f32 / input_pad as f32;

        let rows = item.features.reshape((lead, t))?.to_vec2::<f32>()?;
        for (r, row) in rows.iter().enumerate() {
            let offset = (k * lead + r) * input_pad;
            inputs[offset..offset + t].copy_from_slice(row);
        }

        for (j, ids) in item.targets.iter().enumerate() {
            let offset = (k * num_codecs + j) * target_pad;
            for (u, &id) in ids.iter().enumerate() {
                targets[offset + u] = id;
            }
            target_lengths[k * num_codecs + j] = ids.len() as u32;
        }
    }

    let mut input_shape = Vec::with_capacity(lead_dims.len() + 2);
    input_shape.push(n);
    input_shape.extend_from_slice(&lead_dims);
    input_shape.push(input_pad);

    Ok(Batch {
        dataset_names: items.iter().map(|i| i.dataset_name.clone()).collect(),
        audio_paths: items.iter().map(|i| i.audio_path.clone()).collect(),
        references: items.iter().map(|i| i.reference.clone()).collect(),
        inputs: Tensor::from_vec(inputs, input_shape, device)?,
        input_length_fractions: Tensor::from_vec(fractions, (n,), device)?,
        targets: Tensor::from_vec(targets, (n, num_codecs, target_pad), device)?,
        target_lengths: Tensor::from_vec(target_lengths, (n, num_codecs), device)?,
    })
}

/// Последовательный проход одной эпохи: сэмплер → датасет → коллация.
///
/// Удобство для инструментов и тестов; параллельная выборка остается
/// заботой вызывающего кода.
pub struct EpochIterator<'a> {
    dataset: &'a AudioTextDataset,
    sampler: &'a mut BucketingSampler,
    rng: StdRng,
    pad_to: usize,
}

impl<'a> EpochIterator<'a> {
    /// Создать итератор по оставшимся батчам эпохи.
    pub fn new(
        dataset: &'a AudioTextDataset,
        sampler: &'a mut BucketingSampler,
        rng: StdRng,
        pad_to: usize,
    ) -> Self {
        Self {
            dataset,
            sampler,
            rng,
            pad_to,
        }
    }
}

impl Iterator for EpochIterator<'_> {
    type Item = DataResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.sampler.next_batch()?;
        let items: DataResult<Vec<DatasetItem>> = indices
            .iter()
            .map(|&index| self.dataset.get(index, &mut self.rng))
            .collect();
        Some(items.and_then(|items| collate(&items, self.pad_to, self.dataset.device())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn item(t: usize, targets: Vec<Vec<u32>>, name: &str) -> DatasetItem {
        let device = Device::Cpu;
        DatasetItem {
            dataset_name: name.to_string(),
            audio_path: format!("{name}.wav").into(),
            reference: name.to_string(),
            features: Tensor::from_vec(vec![1.0_f32; 64 * t], (64, t), &device).unwrap(),
            targets,
        }
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(100, 128), 128);
        assert_eq!(padded_len(250, 128), 256);
        assert_eq!(padded_len(128, 128), 256);
        assert_eq!(padded_len(0, 128), 128);
    }

    #[test]
    fn test_collate_pads_and_records_fractions() {
        let device = Device::Cpu;
        let items = vec![
            item(100, vec![vec![1, 2, 3]], "a"),
            item(250, vec![vec![4, 5]], "b"),
        ];

        let batch = collate(&items, 128, &device).unwrap();
        assert_eq!(batch.inputs.dims(), &[2, 64, 256]);

        let fractions = batch.input_length_fractions.to_vec1::<f32>().unwrap();
        assert!((fractions[0] - 100.0 / 256.0).abs() < 1e-6);
        assert!((fractions[1] - 250.0 / 256.0).abs() < 1e-6);
    }

    #[test]
    fn test_collate_two_vocabularies() {
        let device = Device::Cpu;
        let items = vec![
            item(10, vec![vec![1, 2, 3], vec![7]], "a"),
            item(20, vec![vec![4], vec![8, 9, 10, 11]], "b"),
        ];

        let batch = collate(&items, 128, &device).unwrap();
        assert_eq!(batch.targets.dims(), &[2, 2, 128]);

        let lengths = batch.target_lengths.to_vec2::<u32>().unwrap();
        assert_eq!(lengths, vec![vec![3, 1], vec![1, 4]]);

        let targets = batch.targets.to_vec3::<u32>().unwrap();
        assert_eq!(&targets[0][0][..3], &[1, 2, 3]);
        assert_eq!(targets[0][0][3], 0);
        assert_eq!(&targets[1][1][..4], &[8, 9, 10, 11]);
    }

    #[test]
    fn test_collate_passthrough_metadata() {
        let device = Device::Cpu;
        let items = vec![item(5, vec![vec![1]], "x"), item(6, vec![vec![2]], "y")];
        let batch = collate(&items, 128, &device).unwrap();
        assert_eq!(batch.dataset_names, vec!["x", "y"]);
        assert_eq!(batch.references, vec!["x", "y"]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_collate_rejects_empty_and_mismatched() {
        let device = Device::Cpu;
        assert!(collate(&[], 128, &device).is_err());

        let items = vec![
            item(5, vec![vec![1]], "a"),
            item(5, vec![vec![1], vec![2]], "b"),
        ];
        assert!(collate(&items, 128, &device).is_err());
    }

    #[test]
    fn test_collate_zero_copy_prefix() {
        let device = Device::Cpu;
        let items = vec![item(10, vec![vec![1]], "a")];
        let batch = collate(&items, 128, &device).unwrap();
        let inputs = batch.inputs.to_vec3::<f32>().unwrap();
        // данные в префиксе, паддинг нулями
        assert_eq!(inputs[0][0][9], 1.0);
        assert_eq!(inputs[0][0][10], 0.0);
    }
}
