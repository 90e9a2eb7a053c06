//! Загрузка манифестов корпусов.
//!
//! Манифест — CSV (или CSV.gz) без заголовка с колонками
//! `audio_path, reference_text_or_path[, duration_seconds]`.
//! Поле-ссылка на `.txt` подставляется содержимым файла.
//!
//! Ошибки разбора фатальны: лучше упасть до старта обучения, чем
//! молча потерять часть корпуса.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use data_core::{DataError, DataResult, Utterance};
use flate2::read::GzDecoder;
use tracing::debug;

/// Один корпус: упорядоченный список записей одного манифеста.
#[derive(Debug, Clone)]
pub struct Corpus {
    /// Имя корпуса — базовое имя файла манифеста.
    pub name: String,

    /// Записи, отфильтрованные по длительности и отсортированные
    /// по возрастанию длительности.
    pub entries: Vec<Utterance>,
}

impl Corpus {
    /// Загрузить корпус из CSV / CSV.gz манифеста.
    ///
    /// Записи с объявленной длительностью >= `max_duration` отбрасываются.
    /// Сортировка по возрастанию длительности обязательна: на ней держится
    /// бакетирование сэмплера.
    pub fn load(path: impl AsRef<Path>, max_duration: Option<f64>) -> DataResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let file = File::open(path).map_err(|e| {
            DataError::Manifest(format!("не удалось открыть {}: {e}", path.display()))
        })?;
        let is_gzip = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        let reader: Box<dyn Read> = if is_gzip {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(reader));

        let mut entries = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let audio_path = record.get(0).ok_or_else(|| {
                DataError::Manifest(format!("пустая строка манифеста в {}", path.display()))
            })?;
            let reference_field = record.get(1).ok_or_else(|| {
                DataError::Manifest(format!(
                    "нет эталонного текста для {audio_path} в {}",
                    path.display()
                ))
            })?;

            let declared = match record.get(2) {
                Some(field) if !field.trim().is_empty() => {
                    let duration = field.trim().parse::<f64>().map_err(|_| {
                        DataError::Manifest(format!(
                            "некорректная длительность {field:?} для {audio_path} в {}",
                            path.display()
                        ))
                    })?;
                    Some(duration)
                }
                _ => None,
            };

            if let (Some(max), Some(duration)) = (max_duration, declared) {
                if duration >= max {
                    continue;
                }
            }

            let reference = if reference_field.ends_with(".txt") {
                std::fs::read_to_string(reference_field).map_err(|e| {
                    DataError::Manifest(format!(
                        "не удалось прочитать эталон {reference_field}: {e}"
                    ))
                })?
            } else {
                reference_field.to_string()
            };

            entries.push(Utterance {
                audio_path: PathBuf::from(audio_path),
                reference,
                duration: declared.unwrap_or(-1.0),
            });
        }

        entries.sort_by(|a, b| a.duration.total_cmp(&b.duration));

        debug!(
            "манифест {} загружен: {} записей",
            path.display(),
            entries.len()
        );

        Ok(Self { name, entries })
    }

    /// Количество записей.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Корпус пуст.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Суммарная объявленная длительность в секундах (без учета -1).
    pub fn total_duration(&self) -> f64 {
        self.entries
            .iter()
            .filter(|u| u.has_duration())
            .map(|u| u.duration)
            .sum()
    }
}
