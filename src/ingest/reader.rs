//! CSV reader adapters.
//!
//! These stay deliberately thin: they hand raw row shapes to the core and
//! decide nothing about data quality. A missing or structurally unreadable
//! file is fatal; a bad value inside a row is not — that call belongs to
//! the reconciler and the quality engine, where it can be audited.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::IngestError;
use crate::quality::RawTripRow;
use crate::zones::{ZoneGeometryRow, ZoneLookupRow};

/// Header aliases for the zone reference files, lowercased.
const ZONE_LOCATION_ID: &[&str] = &["locationid", "location_id"];
const ZONE_BOROUGH: &[&str] = &["borough"];
const ZONE_NAME: &[&str] = &["zone"];
const ZONE_SERVICE: &[&str] = &["service_zone", "servicezone"];

/// Opens a CSV file, mapping the obvious failure to a fatal ingest error.
fn open_csv(path: &Path) -> Result<csv::Reader<File>, IngestError> {
    if !path.exists() {
        return Err(IngestError::FileNotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|source| IngestError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file))
}

/// Finds the column index for a field by its alias list.
fn column_index(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.trim().to_ascii_lowercase();
        aliases.contains(&header.as_str())
    })
}

/// Streaming reader over raw trip rows.
///
/// Yields one [`RawTripRow`] per CSV record, tagged with the source file
/// name and 1-based data row number. A structurally broken record is a
/// fatal [`IngestError::MalformedCsv`].
pub struct TripRowReader {
    path: PathBuf,
    source_file: String,
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<File>,
    row_num: u64,
}

impl TripRowReader {
    /// Opens a trip CSV for streaming.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let mut reader = open_csv(path)?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|err| IngestError::MalformedCsv {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?
            .iter()
            .map(|header| header.trim().to_string())
            .collect();
        if headers.is_empty() {
            return Err(IngestError::MissingHeader(path.to_path_buf()));
        }

        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!(file = %source_file, columns = headers.len(), "trip file opened");

        Ok(Self {
            path: path.to_path_buf(),
            source_file,
            headers,
            records: reader.into_records(),
            row_num: 0,
        })
    }
}

impl Iterator for TripRowReader {
    type Item = Result<RawTripRow, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(err) => {
                return Some(Err(IngestError::MalformedCsv {
                    path: self.path.clone(),
                    message: err.to_string(),
                }));
            }
        };
        self.row_num += 1;

        let fields = self
            .headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()));
        Some(Ok(RawTripRow::new(
            self.source_file.clone(),
            self.row_num,
            fields,
        )))
    }
}

/// Reads the zone name lookup file in full. Reference data is small.
pub fn read_zone_lookup(path: impl AsRef<Path>) -> Result<Vec<ZoneLookupRow>, IngestError> {
    let path = path.as_ref();
    let (headers, records) = read_reference(path)?;
    let columns = ZoneColumns::locate(path, &headers)?;

    Ok(records
        .into_iter()
        .map(|record| ZoneLookupRow {
            location_id: columns.value(&record, columns.location_id),
            borough: columns.value_opt(&record, columns.borough),
            zone: columns.value_opt(&record, columns.zone),
            service_zone: columns.value_opt(&record, columns.service_zone),
        })
        .collect())
}

/// Reads the zone geometry metadata file in full. Values are passed
/// through untrimmed so fixed-width padding stays visible to the
/// reconciler.
pub fn read_zone_geometry(path: impl AsRef<Path>) -> Result<Vec<ZoneGeometryRow>, IngestError> {
    let path = path.as_ref();
    let (headers, records) = read_reference(path)?;
    let columns = ZoneColumns::locate(path, &headers)?;

    Ok(records
        .into_iter()
        .map(|record| ZoneGeometryRow {
            location_id: columns.value(&record, columns.location_id),
            borough: columns.value_opt(&record, columns.borough),
            zone: columns.value_opt(&record, columns.zone),
            service_zone: columns.value_opt(&record, columns.service_zone),
        })
        .collect())
}

/// Reads a whole reference CSV, failing fast on structural problems.
fn read_reference(
    path: &Path,
) -> Result<(csv::StringRecord, Vec<csv::StringRecord>), IngestError> {
    let mut reader = open_csv(path)?;
    let headers = reader
        .headers()
        .map_err(|err| IngestError::MalformedCsv {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?
        .clone();
    if headers.is_empty() {
        return Err(IngestError::MissingHeader(path.to_path_buf()));
    }

    let records = reader
        .into_records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| IngestError::MalformedCsv {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    Ok((headers, records))
}

/// Column positions of the zone reference shape.
struct ZoneColumns {
    location_id: usize,
    borough: Option<usize>,
    zone: Option<usize>,
    service_zone: Option<usize>,
}

impl ZoneColumns {
    /// Locates the reference columns. A file without a location id column
    /// is fundamentally unreadable.
    fn locate(path: &Path, headers: &csv::StringRecord) -> Result<Self, IngestError> {
        let location_id = column_index(headers, ZONE_LOCATION_ID).ok_or_else(|| {
            IngestError::MalformedCsv {
                path: path.to_path_buf(),
                message: "no location id column found".to_string(),
            }
        })?;
        Ok(Self {
            location_id,
            borough: column_index(headers, ZONE_BOROUGH),
            zone: column_index(headers, ZONE_NAME),
            service_zone: column_index(headers, ZONE_SERVICE),
        })
    }

    fn value(&self, record: &csv::StringRecord, index: usize) -> String {
        record.get(index).unwrap_or_default().to_string()
    }

    fn value_opt(&self, record: &csv::StringRecord, index: Option<usize>) -> String {
        index
            .and_then(|idx| record.get(idx))
            .unwrap_or_default()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_trip_reader_tags_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "trips.csv",
            "tpep_pickup_datetime,fare_amount\n2019-01-01 08:00:00,12.5\n2019-01-01 09:00:00,8.0\n",
        );

        let rows: Vec<RawTripRow> = TripRowReader::open(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record_key(), "trips.csv:1");
        assert_eq!(rows[1].record_key(), "trips.csv:2");
        assert_eq!(
            rows[0].fields.get("fare_amount").map(String::as_str),
            Some("12.5")
        );
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = TripRowReader::open("/nonexistent/trips.csv");
        assert!(matches!(result, Err(IngestError::FileNotFound(_))));
    }

    #[test]
    fn test_zone_lookup_header_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "zones.csv",
            "LocationID,Borough,Zone,service_zone\n1,EWR,Newark Airport,EWR\n",
        );

        let rows = read_zone_lookup(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].location_id, "1");
        assert_eq!(rows[0].borough, "EWR");
    }

    #[test]
    fn test_geometry_values_not_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "geometry.csv",
            "location_id,borough,zone,service_zone\n12   ,Manhattan,SoHo,Yellow Zone\n",
        );

        let rows = read_zone_geometry(&path).unwrap();
        assert_eq!(rows[0].location_id, "12   ");
    }

    #[test]
    fn test_missing_location_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "zones.csv", "borough,zone\nQueens,Astoria\n");

        let err = read_zone_lookup(&path).unwrap_err();
        assert!(matches!(err, IngestError::MalformedCsv { .. }));
    }
}
