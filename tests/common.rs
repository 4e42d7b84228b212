use std::{collections::VecDeque, fs::File, io::Cursor, path::Path};

use csv::ReaderBuilder;
use mooring::{
    Condition, Driver, DriverConfig, Format, FormatConfig, Timestamp,
    codec::DecodeError,
    driver::Collect,
    particle::{FromParticle, FromParticles},
};

const IMU: &str = "tests/fixtures/imu_20111011_233842.3dmgx3";
const LOGGER: &str = "tests/fixtures/suna_logger.log";
const SPECTRAL: &str = "tests/fixtures/acs_20140102_030405.dat";

fn imu() -> impl Format {
    FormatConfig::Imu {
        source_name: "imu_20111011_233842.3dmgx3".into(),
    }
    .build()
    .unwrap()
}

fn logger() -> impl Format {
    FormatConfig::Logger.build().unwrap()
}

fn spectral() -> impl Format {
    FormatConfig::Spectral {
        source_name: "acs_20140102_030405.dat".into(),
    }
    .build()
    .unwrap()
}

/// Parse a whole file, checking every particle against the expected values.
fn decode_file(format: impl Format, path: &str) -> Vec<Condition> {
    let file = File::open(path).unwrap();
    let len = file.metadata().unwrap().len();

    let mut driver = Driver::new(format, None, file, Collect::new(Validator::new(path))).unwrap();
    driver.get_records(usize::MAX).unwrap();
    driver.flush().unwrap();
    assert_eq!(driver.position(), len);

    let (_, collect) = driver.into_parts();
    collect.records.finish();
    collect.conditions
}

/// Parse a file read in small pieces, a few particles per call.
fn decode_pieces(format: impl Format, path: &str) -> Vec<Condition> {
    let data = std::fs::read(path).unwrap();
    let len = data.len() as u64;

    let config = DriverConfig { read_size: 7 };
    let collect = Collect::new(Validator::new(path));
    let mut driver = Driver::with_config(format, None, Cursor::new(data), collect, config).unwrap();

    while !driver.get_records(3).unwrap().is_empty() {}
    driver.flush().unwrap();
    assert_eq!(driver.position(), len);

    let (_, collect) = driver.into_parts();
    collect.records.finish();
    collect.conditions
}

fn unexpected_lengths(conditions: &[Condition]) -> Vec<u64> {
    conditions
        .iter()
        .filter(|c| matches!(c, Condition::Unexpected { .. }))
        .map(Condition::len)
        .collect()
}

#[test]
fn decode_file_imu() {
    let conditions = decode_file(imu(), IMU);
    assert_eq!(unexpected_lengths(&conditions), [9, 14]);
    assert_eq!(conditions.len(), 2);
}

#[test]
fn decode_pieces_imu() {
    let conditions = decode_pieces(imu(), IMU);
    assert_eq!(unexpected_lengths(&conditions), [9, 14]);
}

#[test]
fn decode_file_logger() {
    let conditions = decode_file(logger(), LOGGER);
    assert_eq!(conditions.len(), 2);
    assert_eq!(unexpected_lengths(&conditions), [11]);
    assert!(conditions.iter().any(|c| matches!(
        c,
        Condition::Sample {
            error: DecodeError::NonZeroSum { .. },
            ..
        }
    )));
}

#[test]
fn decode_pieces_logger() {
    let conditions = decode_pieces(logger(), LOGGER);
    assert_eq!(conditions.len(), 2);
}

#[test]
fn decode_file_spectral() {
    let conditions = decode_file(spectral(), SPECTRAL);
    assert_eq!(unexpected_lengths(&conditions), [3]);
    assert_eq!(conditions.len(), 1);
}

#[test]
fn decode_pieces_spectral() {
    let conditions = decode_pieces(spectral(), SPECTRAL);
    assert_eq!(unexpected_lengths(&conditions), [3]);
}

/// Checks published particles against rows of `kind, timestamp, field,
/// value, ...`, list items separated by spaces.
struct Validator {
    row: VecDeque<String>,
    rows: VecDeque<VecDeque<String>>,
    field: Option<String>,
    items: VecDeque<String>,
}

impl Validator {
    fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().with_extension("csv");

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_path(path)
            .unwrap();

        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
            .collect();

        Self {
            row: VecDeque::new(),
            rows,
            field: None,
            items: VecDeque::new(),
        }
    }

    fn end_particle(&mut self) {
        assert!(self.items.is_empty(), "unreceived items {:?}", self.items);
        assert!(self.row.is_empty(), "unreceived fields {:?}", self.row);
        self.field = None;
    }

    fn finish(mut self) {
        self.end_particle();
        assert!(self.rows.is_empty(), "{} particles not produced", self.rows.len());
    }

    fn next_value(&mut self, field: &str) -> String {
        if self.field.as_deref() != Some(field) {
            assert!(self.items.is_empty(), "unreceived items {:?}", self.items);
            assert_eq!(self.row.pop_front().as_deref(), Some(field));

            let value = self.row.pop_front().unwrap();
            self.items = value.split(' ').map(str::to_string).collect();
            self.field = Some(field.to_string());
        }

        self.items.pop_front().unwrap()
    }
}

impl FromParticles for Validator {
    fn add_particle(&mut self, kind: &str) -> Option<&mut dyn FromParticle> {
        self.end_particle();
        self.row = self.rows.pop_front().unwrap();
        assert_eq!(self.row.pop_front().as_deref(), Some(kind));
        Some(self)
    }
}

impl FromParticle for Validator {
    fn add_timestamp(&mut self, timestamp: Timestamp) {
        let expected = self.row.pop_front().unwrap().parse().unwrap();
        assert_eq!(timestamp, Timestamp::from_unix_seconds(expected));
    }
    fn add_u64(&mut self, field: &str, value: u64) {
        assert_eq!(self.next_value(field), value.to_string(), "{field}");
    }
    fn add_i64(&mut self, field: &str, value: i64) {
        assert_eq!(self.next_value(field), value.to_string(), "{field}");
    }
    fn add_f64(&mut self, field: &str, value: f64) {
        let expected: f64 = self.next_value(field).parse().unwrap();
        assert_eq!(expected, value, "{field}");
    }
    fn add_bool(&mut self, field: &str, value: bool) {
        assert_eq!(self.next_value(field), value.to_string(), "{field}");
    }
    fn add_text(&mut self, field: &str, value: &str) {
        assert_eq!(self.next_value(field), value, "{field}");
    }
}
