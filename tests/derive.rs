#![allow(dead_code)]
#![cfg(feature = "derive")]

use std::{fs::read_to_string, io::Cursor, path::Path};

use mooring::{
    Driver, FormatConfig, Timestamp,
    driver::Collect,
    formats::Profile,
    particle::{FromParticle, FromParticles},
};
use pretty_assertions::assert_eq;

#[test]
fn collect_spectral_packets() {
    const PATH: &str = "tests/fixtures/acs_20140102_030405.dat";
    let data = std::fs::read(PATH).unwrap();

    let format = FormatConfig::Spectral {
        source_name: "acs_20140102_030405.dat".into(),
    }
    .build()
    .unwrap();
    let collect = Collect::new(SpectralRecordSet::default());
    let mut driver = Driver::new(format, None, Cursor::new(data), collect).unwrap();
    driver.get_records(usize::MAX).unwrap();

    let (_, Collect { records, .. }) = driver.into_parts();

    let path = Path::new(PATH).with_extension("dbg");
    let debug = read_to_string(path).unwrap();
    assert_eq!(format!("{records:?}"), debug.trim());
}

#[test]
fn collect_logger_frames() {
    let file = std::fs::File::open("tests/fixtures/suna_logger.log").unwrap();

    let format = FormatConfig::Logger.build().unwrap();
    let collect = Collect::new(NutrientRecordSet::default());
    let mut driver = Driver::new(format, None, file, collect).unwrap();
    driver.get_records(usize::MAX).unwrap();

    let (_, Collect {
        records,
        conditions,
        state,
    }) = driver.into_parts();

    assert_eq!(records.dark.len(), 2);
    assert_eq!(records.light.len(), 5);
    assert_eq!(conditions.len(), 2);
    assert!(state.is_some());

    let first = &records.dark[0];
    assert_eq!(first.serial_number, Some(264));
    assert_eq!(first.year_day, Some(93));
    assert_eq!(first.decimal_hours, Some(12.0));
    assert_eq!(first.time, Some(Timestamp::from_unix_seconds(1_396_526_400.5)));
    assert!(records.light.iter().all(|l| l.nitrate.is_some()));
}

#[test]
fn collect_profile_text() {
    let mut payload = [0, 0, 1, 0, 0, 2, 0, 0, 3, 0, 4].repeat(2);
    payload.extend_from_slice(&[0xFF; 11]);
    payload.extend_from_slice(&500u32.to_be_bytes());
    payload.extend_from_slice(&520u32.to_be_bytes());

    let mut data = format!("\x01WE00123_{:04X}u000001F4_2A\x02", payload.len()).into_bytes();
    data.extend(payload);
    data.push(0x03);

    let collect = Collect::new(ProfileRecordSet::default());
    let mut driver = Driver::new(Profile::new(), None, Cursor::new(data), collect).unwrap();
    driver.get_records(usize::MAX).unwrap();
    let (_, Collect { records, .. }) = driver.into_parts();

    let metadata = records.metadata.unwrap();
    assert_eq!(metadata.controller_id.as_deref(), Some("00123"));
    assert_eq!(metadata.block_number, Some(0x2A));
    assert_eq!((metadata.time_on, metadata.time_off), (Some(500), Some(520)));

    let times = records
        .samples
        .iter()
        .map(|s| s.time.map(Timestamp::unix_seconds))
        .collect::<Vec<_>>();
    assert_eq!(times, [Some(500.0), Some(510.0)]);
    assert_eq!(records.samples[1].temperature, Some(2));
}

#[derive(Debug, Default, FromParticles)]
struct SpectralRecordSet {
    #[particle("spectral_metadata")]
    metadata: Option<Metadata>,
    #[particle("spectral_sample")]
    samples: Vec<Sample>,
}

#[derive(Debug, Default, FromParticle)]
struct Metadata {
    #[field("serial_number")]
    serial_number: Option<u64>,
    #[field("meter_type")]
    meter_type: Option<u64>,
    #[field("num_wavelengths")]
    num_wavelengths: Option<u64>,
}

#[derive(Debug, Default, FromParticle)]
struct Sample {
    #[field(time)]
    time: Option<Timestamp>,
    #[field("elapsed_ms")]
    elapsed_ms: Option<u64>,
    #[field("pressure_counts")]
    pressure_counts: Option<u64>,
    #[field("c_signal", |v, c: u64| v.push(c))]
    c_signal: Vec<u64>,
    #[field("a_signal", |v, c: u64| v.push(c))]
    a_signal: Vec<u64>,
}

#[derive(Debug, Default, FromParticles)]
struct NutrientRecordSet {
    #[particle("nutrient_light")]
    light: Vec<Nutrient>,
    #[particle("nutrient_dark")]
    dark: Vec<Nutrient>,
}

#[derive(Debug, Default, FromParticle)]
struct Nutrient {
    #[field(time)]
    time: Option<Timestamp>,
    #[field("serial_number")]
    serial_number: Option<u64>,
    #[field("year_day")]
    year_day: Option<i64>,
    #[field("decimal_hours")]
    decimal_hours: Option<f64>,
    #[field("nitrate_concentration")]
    nitrate: Option<f64>,
    // Not a field of these particles.
    #[field("salinity")]
    salinity: Option<f64>,
}

#[derive(Debug, Default, FromParticles)]
struct ProfileRecordSet {
    #[particle("profile_metadata")]
    metadata: Option<ProfileMetadata>,
    #[particle("profile_sample")]
    samples: Vec<ProfileSample>,
}

#[derive(Debug, Default, FromParticle)]
struct ProfileMetadata {
    #[field("controller_id")]
    controller_id: Option<String>,
    #[field("block_number")]
    block_number: Option<u64>,
    #[field("time_on")]
    time_on: Option<u64>,
    #[field("time_off")]
    time_off: Option<u64>,
}

#[derive(Debug, Default, FromParticle)]
struct ProfileSample {
    #[field(time)]
    time: Option<Timestamp>,
    #[field("temperature")]
    temperature: Option<u64>,
}
