//! Arrow layout of a persisted partition.
//!
//! One row per profile. Profile-indexed fields are flat columns; every
//! observation-indexed field is a large-list column whose flattened values are
//! the observation array and whose offsets are the profiles' row-size blocks.

use crate::error::{ProcessingError, Result};
use crate::models::{Observation, PartitionDataset, Profile, RowSizes};
use arrow::array::*;
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;

fn item_field(data_type: DataType) -> FieldRef {
    Arc::new(Field::new("item", data_type, true))
}

fn list_field(name: &str, data_type: DataType) -> Field {
    Field::new(name, DataType::LargeList(item_field(data_type)), false)
}

fn utc_metadata(extra: &[(&str, &str)]) -> HashMap<String, String> {
    let mut metadata = HashMap::from([("timezone".to_string(), "UTC".to_string())]);
    for (key, value) in extra {
        metadata.insert(key.to_string(), value.to_string());
    }
    metadata
}

/// Arrow schema shared by every partition file.
pub fn dataset_schema() -> SchemaRef {
    let fields = vec![
        // Coordinates
        Field::new("timestamp", DataType::Int64, false).with_metadata(utc_metadata(&[(
            "units",
            "seconds since 1970-01-01 00:00:00",
        )])),
        Field::new("lat", DataType::Float64, false),
        Field::new("lon", DataType::Float64, false),
        // Profile-indexed
        Field::new("orig_cruise_id", DataType::Utf8, false),
        Field::new("instrument_type", DataType::Utf8, false),
        Field::new("station_no", DataType::Utf8, false),
        Field::new("source_id", DataType::Utf8, false),
        Field::new("lonlat_flag", DataType::UInt8, true),
        Field::new("datestr", DataType::Utf8, false).with_metadata(utc_metadata(&[])),
        Field::new("datestr_flag", DataType::UInt8, true),
        Field::new("shallowest_depth", DataType::Float64, true),
        Field::new("deepest_depth", DataType::Float64, false),
        Field::new("depth_row_size", DataType::UInt32, false),
        Field::new("press_row_size", DataType::UInt32, false),
        Field::new("temp_row_size", DataType::UInt32, false),
        Field::new("psal_row_size", DataType::UInt32, false),
        // Observation-indexed
        list_field("parent_index", DataType::Int64),
        list_field("depth", DataType::Float64),
        list_field("depth_flag", DataType::UInt8),
        list_field("press", DataType::Float64),
        list_field("press_flag", DataType::UInt8),
        list_field("temp", DataType::Float64),
        list_field("temp_flag", DataType::UInt8),
        list_field("psal", DataType::Float64),
        list_field("psal_flag", DataType::UInt8),
    ];

    Arc::new(Schema::new(fields))
}

/// Variables held per observation, readable by name.
pub const OBSERVATION_VARIABLES: [&str; 4] = ["depth", "press", "temp", "psal"];

/// Variables held per profile, readable by name.
pub const PROFILE_VARIABLES: [&str; 5] = ["lat", "lon", "timestamp", "shallowest_depth", "deepest_depth"];

/// Convert a dataset to a single record batch in `schema`.
pub fn dataset_to_batch(dataset: &PartitionDataset, schema: SchemaRef) -> Result<RecordBatch> {
    let profiles = &dataset.profiles;
    let obs = &dataset.observations;

    let offsets = OffsetBuffer::<i64>::from_lengths(profiles.iter().map(|p| p.row_sizes.block_len()));
    let list = |data_type: DataType, values: ArrayRef| -> Result<ArrayRef> {
        Ok(Arc::new(LargeListArray::try_new(
            item_field(data_type),
            offsets.clone(),
            values,
            None,
        )?))
    };
    let floats = |f: fn(&Observation) -> Option<f64>| -> ArrayRef {
        Arc::new(Float64Array::from(obs.iter().map(f).collect::<Vec<_>>()))
    };
    let flags = |f: fn(&Observation) -> Option<u8>| -> ArrayRef {
        Arc::new(UInt8Array::from(obs.iter().map(f).collect::<Vec<_>>()))
    };
    let strings = |f: fn(&Profile) -> &str| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(profiles.iter().map(f)))
    };
    let sizes = |f: fn(&RowSizes) -> u32| -> ArrayRef {
        Arc::new(UInt32Array::from_iter_values(profiles.iter().map(|p| f(&p.row_sizes))))
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(profiles.iter().map(|p| p.timestamp))),
        Arc::new(Float64Array::from_iter_values(profiles.iter().map(|p| p.lat))),
        Arc::new(Float64Array::from_iter_values(profiles.iter().map(|p| p.lon))),
        strings(|p| p.orig_cruise_id.as_str()),
        strings(|p| p.instrument_type.as_str()),
        strings(|p| p.station_no.as_str()),
        strings(|p| p.source_id.as_str()),
        Arc::new(UInt8Array::from(profiles.iter().map(|p| p.lonlat_flag).collect::<Vec<_>>())),
        strings(|p| p.datestr.as_str()),
        Arc::new(UInt8Array::from(profiles.iter().map(|p| p.datestr_flag).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(
            profiles.iter().map(|p| p.shallowest_depth).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from_iter_values(profiles.iter().map(|p| p.deepest_depth))),
        sizes(|s| s.depth),
        sizes(|s| s.press),
        sizes(|s| s.temp),
        sizes(|s| s.psal),
        list(
            DataType::Int64,
            Arc::new(Int64Array::from_iter_values(dataset.parent_index.iter().copied())),
        )?,
        list(DataType::Float64, floats(|o| o.depth))?,
        list(DataType::UInt8, flags(|o| o.depth_flag))?,
        list(DataType::Float64, floats(|o| o.press))?,
        list(DataType::UInt8, flags(|o| o.press_flag))?,
        list(DataType::Float64, floats(|o| o.temp))?,
        list(DataType::UInt8, flags(|o| o.temp_flag))?,
        list(DataType::Float64, floats(|o| o.psal))?,
        list(DataType::UInt8, flags(|o| o.psal_flag))?,
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| {
            ProcessingError::InvalidFormat(format!(
                "Column '{}' is missing or has an unexpected type",
                name
            ))
        })
}

/// Per-profile lengths and the flattened values of a list column.
fn flatten(batch: &RecordBatch, name: &str) -> Result<(Vec<usize>, ArrayRef)> {
    let list = column::<LargeListArray>(batch, name)?;
    let offsets = list.value_offsets();
    let lengths = offsets.windows(2).map(|w| (w[1] - w[0]) as usize).collect();
    let start = offsets.first().copied().unwrap_or(0) as usize;
    let end = offsets.last().copied().unwrap_or(0) as usize;
    Ok((lengths, list.values().slice(start, end - start)))
}

fn typed<T: Array + Clone + 'static>(values: &ArrayRef, name: &str) -> Result<T> {
    values
        .as_any()
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| {
            ProcessingError::InvalidFormat(format!("List column '{}' has an unexpected item type", name))
        })
}

/// Flattened values of one observation-indexed float variable.
pub fn observation_floats(batch: &RecordBatch, name: &str) -> Result<Vec<Option<f64>>> {
    let (_, values) = flatten(batch, name)?;
    Ok(typed::<Float64Array>(&values, name)?.iter().collect())
}

/// Flattened values of one observation-indexed flag variable.
pub fn observation_flags(batch: &RecordBatch, name: &str) -> Result<Vec<Option<u8>>> {
    let (_, values) = flatten(batch, name)?;
    Ok(typed::<UInt8Array>(&values, name)?.iter().collect())
}

/// Append the profiles and observations held in `batch` to `dataset`.
pub fn append_batch(dataset: &mut PartitionDataset, batch: &RecordBatch) -> Result<()> {
    let timestamp = column::<Int64Array>(batch, "timestamp")?;
    let lat = column::<Float64Array>(batch, "lat")?;
    let lon = column::<Float64Array>(batch, "lon")?;
    let cruise = column::<StringArray>(batch, "orig_cruise_id")?;
    let instrument = column::<StringArray>(batch, "instrument_type")?;
    let station = column::<StringArray>(batch, "station_no")?;
    let source = column::<StringArray>(batch, "source_id")?;
    let lonlat_flag = column::<UInt8Array>(batch, "lonlat_flag")?;
    let datestr = column::<StringArray>(batch, "datestr")?;
    let datestr_flag = column::<UInt8Array>(batch, "datestr_flag")?;
    let shallowest = column::<Float64Array>(batch, "shallowest_depth")?;
    let deepest = column::<Float64Array>(batch, "deepest_depth")?;
    let depth_rows = column::<UInt32Array>(batch, "depth_row_size")?;
    let press_rows = column::<UInt32Array>(batch, "press_row_size")?;
    let temp_rows = column::<UInt32Array>(batch, "temp_row_size")?;
    let psal_rows = column::<UInt32Array>(batch, "psal_row_size")?;

    let optional = |array: &UInt8Array, i: usize| (!array.is_null(i)).then(|| array.value(i));

    let mut block_lengths = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let row_sizes = RowSizes {
            depth: depth_rows.value(i),
            press: press_rows.value(i),
            temp: temp_rows.value(i),
            psal: psal_rows.value(i),
        };
        block_lengths.push(row_sizes.block_len());

        dataset.profiles.push(Profile {
            orig_cruise_id: cruise.value(i).to_string(),
            instrument_type: instrument.value(i).to_string(),
            station_no: station.value(i).to_string(),
            source_id: source.value(i).to_string(),
            lat: lat.value(i),
            lon: lon.value(i),
            lonlat_flag: optional(lonlat_flag, i),
            timestamp: timestamp.value(i),
            datestr: datestr.value(i).to_string(),
            datestr_flag: optional(datestr_flag, i),
            shallowest_depth: (!shallowest.is_null(i)).then(|| shallowest.value(i)),
            deepest_depth: deepest.value(i),
            row_sizes,
        });
    }

    let (parent_lengths, parent_values) = flatten(batch, "parent_index")?;
    if parent_lengths != block_lengths {
        return Err(ProcessingError::consistency(
            dataset.key,
            "observation list lengths disagree with temp_row_size",
        ));
    }
    let parents = typed::<Int64Array>(&parent_values, "parent_index")?;
    dataset.parent_index.extend(parents.values().iter().copied());

    let depth = observation_floats(batch, "depth")?;
    let depth_flag = observation_flags(batch, "depth_flag")?;
    let press = observation_floats(batch, "press")?;
    let press_flag = observation_flags(batch, "press_flag")?;
    let temp = observation_floats(batch, "temp")?;
    let temp_flag = observation_flags(batch, "temp_flag")?;
    let psal = observation_floats(batch, "psal")?;
    let psal_flag = observation_flags(batch, "psal_flag")?;

    let expected = parents.len();
    for (name, len) in [
        ("depth", depth.len()),
        ("depth_flag", depth_flag.len()),
        ("press", press.len()),
        ("press_flag", press_flag.len()),
        ("temp", temp.len()),
        ("temp_flag", temp_flag.len()),
        ("psal", psal.len()),
        ("psal_flag", psal_flag.len()),
    ] {
        if len != expected {
            return Err(ProcessingError::consistency(
                dataset.key,
                format!("{} has {} observations, parent_index has {}", name, len, expected),
            ));
        }
    }

    dataset.observations.extend((0..expected).map(|j| Observation {
        depth: depth[j],
        press: press[j],
        temp: temp[j],
        psal: psal[j],
        depth_flag: depth_flag[j],
        press_flag: press_flag[j],
        temp_flag: temp_flag[j],
        psal_flag: psal_flag[j],
    }));

    Ok(())
}
