use chrono::NaiveDate;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBytes, PyDict, PyString};
use recordkit_export_xlsx::conf::derive_default_export_options;
use recordkit_export_xlsx::spec::{
    EnumRawTimestamp, EnumRecordOrder, ExportError, SpecExportOptions, SpecRawRecord,
    SpecRecordChildren, SpecRecordFilter,
};
use recordkit_export_xlsx::{RecordStoreMemory, export_records};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "recordkit.export.xlsx.v1";
const C_BRIDGE_TRANSPORT: &str = "python_objects";
const C_FILTER_DATE_FORMAT: &str = "%Y-%m-%d";

/// Export parent records with their child sub-lists into XLSX bytes.
///
/// `records` is an iterable of dicts or attribute objects, or a JSON records
/// document (`{"records": [...], "children": {...}}`). `children` maps a record
/// id to its `detail_items`/`participant_items` when they are not attached to
/// the record itself.
#[pyfunction]
#[pyo3(signature = (records, filter = None, options = None, children = None))]
fn export_records_xlsx<'py>(
    py: Python<'py>,
    records: &Bound<'py, PyAny>,
    filter: Option<&Bound<'py, PyAny>>,
    options: Option<&Bound<'py, PyAny>>,
    children: Option<&Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyBytes>> {
    let mut store = if records.is_instance_of::<PyString>() {
        RecordStoreMemory::from_json_str(&records.extract::<String>()?)
            .map_err(map_export_error)?
    } else {
        let mut l_records = Vec::new();
        for obj_record in records.try_iter()? {
            l_records.push(parse_raw_record(&obj_record?)?);
        }
        RecordStoreMemory::new(l_records)
    };
    if let Some(obj_children) = children.filter(|obj| !obj.is_none()) {
        let dict_children = obj_children
            .downcast::<PyDict>()
            .map_err(|_| PyValueError::new_err("children must be a dict keyed by record id."))?;
        for (obj_id, obj_items) in dict_children.iter() {
            store = store.with_children(
                obj_id.extract::<String>()?,
                parse_children(&obj_items)?,
            );
        }
    }

    let cfg_filter = parse_record_filter(filter)?.unwrap_or_default();
    let cfg_options =
        parse_export_options(py, options)?.unwrap_or_else(derive_default_export_options);

    let output = py
        .allow_threads(|| {
            futures::executor::block_on(export_records(&store, &cfg_filter, &cfg_options))
        })
        .map_err(map_export_error)?;

    Ok(PyBytes::new(py, &output.buffer))
}

fn map_export_error(err: ExportError) -> PyErr {
    match err {
        ExportError::Options(_) | ExportError::Capacity(_) => {
            PyValueError::new_err(err.to_string())
        }
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

fn parse_raw_record(obj: &Bound<'_, PyAny>) -> PyResult<SpecRawRecord> {
    Ok(SpecRawRecord {
        id: extract_optional_field::<String>(obj, "id")?.unwrap_or_default(),
        title: extract_optional_field::<String>(obj, "title")?.unwrap_or_default(),
        leader: extract_optional_field::<String>(obj, "leader")?.unwrap_or_default(),
        place: extract_optional_field::<String>(obj, "place")?.unwrap_or_default(),
        time: extract_optional_field::<String>(obj, "time")?.unwrap_or_default(),
        category: extract_optional_field::<String>(obj, "category")?.unwrap_or_default(),
        timestamp: match extract_optional_field_bound(obj, "timestamp")? {
            Some(obj_ts) => Some(parse_raw_timestamp(&obj_ts)?),
            None => None,
        },
        detail_items: extract_first_field::<Vec<String>>(obj, &["detail_items", "detailItems"])?,
        participant_items: extract_first_field::<Vec<String>>(
            obj,
            &["participant_items", "participantItems"],
        )?,
    })
}

fn parse_children(obj: &Bound<'_, PyAny>) -> PyResult<SpecRecordChildren> {
    Ok(SpecRecordChildren {
        detail_items: extract_first_field::<Vec<String>>(obj, &["detail_items", "detailItems"])?
            .unwrap_or_default(),
        participant_items: extract_first_field::<Vec<String>>(
            obj,
            &["participant_items", "participantItems"],
        )?
        .unwrap_or_default(),
    })
}

/// Accepts `str`, `datetime`-like objects and `{seconds, nanoseconds}` pairs.
fn parse_raw_timestamp(obj: &Bound<'_, PyAny>) -> PyResult<EnumRawTimestamp> {
    if obj.is_instance_of::<PyString>() {
        return Ok(EnumRawTimestamp::Text(obj.extract::<String>()?));
    }

    if !obj.is_instance_of::<PyDict>()
        && obj.hasattr("timestamp")?
        && obj.getattr("timestamp")?.is_callable()
    {
        let n_epoch = obj.call_method0("timestamp")?.extract::<f64>()?;
        return Ok(derive_epoch_timestamp(n_epoch));
    }

    let seconds = extract_first_field::<i64>(obj, &["seconds", "_seconds"])?;
    let nanoseconds = extract_first_field::<i64>(obj, &["nanoseconds", "_nanoseconds"])?;
    match seconds {
        Some(seconds) => Ok(EnumRawTimestamp::Epoch {
            seconds,
            nanoseconds: nanoseconds.unwrap_or(0),
        }),
        // Left to the aggregator, which excludes the record as malformed.
        None => Ok(EnumRawTimestamp::Text(obj.str()?.to_string())),
    }
}

fn derive_epoch_timestamp(n_epoch: f64) -> EnumRawTimestamp {
    let n_seconds = n_epoch.floor();
    let n_nanos = ((n_epoch - n_seconds) * 1e9).round() as i64;
    EnumRawTimestamp::Epoch {
        seconds: n_seconds as i64,
        nanoseconds: n_nanos.min(999_999_999),
    }
}

fn parse_record_filter(obj: Option<&Bound<'_, PyAny>>) -> PyResult<Option<SpecRecordFilter>> {
    let Some(obj) = obj else {
        return Ok(None);
    };
    if obj.is_none() {
        return Ok(None);
    }

    Ok(Some(SpecRecordFilter {
        category: extract_optional_field::<String>(obj, "category")?,
        date_start: parse_filter_date(extract_optional_field_bound(obj, "date_start")?)?,
        date_end: parse_filter_date(extract_optional_field_bound(obj, "date_end")?)?,
    }))
}

/// `date` objects and ISO strings both stringify to `YYYY-MM-DD`.
fn parse_filter_date(obj: Option<Bound<'_, PyAny>>) -> PyResult<Option<NaiveDate>> {
    let Some(obj) = obj else {
        return Ok(None);
    };
    let c_date = obj.str()?.to_string();
    let c_date = c_date.get(..10).unwrap_or(&c_date);
    NaiveDate::parse_from_str(c_date, C_FILTER_DATE_FORMAT)
        .map(Some)
        .map_err(|err| PyValueError::new_err(format!("Invalid filter date {c_date:?}: {err}")))
}

/// Options come as a JSON document, a dict, or an attribute object.
fn parse_export_options(
    py: Python<'_>,
    obj: Option<&Bound<'_, PyAny>>,
) -> PyResult<Option<SpecExportOptions>> {
    let Some(obj) = obj else {
        return Ok(None);
    };
    if obj.is_none() {
        return Ok(None);
    }

    if obj.is_instance_of::<PyString>() || obj.is_instance_of::<PyDict>() {
        let c_json = if obj.is_instance_of::<PyString>() {
            obj.extract::<String>()?
        } else {
            py.import("json")?
                .call_method1("dumps", (obj,))?
                .extract::<String>()?
        };
        return SpecExportOptions::from_json_str(&c_json)
            .map(Some)
            .map_err(map_export_error);
    }

    let mut cfg_options = derive_default_export_options();
    if let Some(v) = extract_optional_attr::<String>(obj, "title")? {
        cfg_options.title = v;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "sheet_name")? {
        cfg_options.sheet_name = v;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "label_date_start")? {
        cfg_options.label_date_start = v;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "label_date_end")? {
        cfg_options.label_date_end = v;
    }
    if let Some(v) = extract_optional_attr::<usize>(obj, "width_cell_min")? {
        cfg_options.width_cell_min = v;
    }
    if let Some(v) = extract_optional_attr::<bool>(obj, "if_estimate_display_width")? {
        cfg_options.if_estimate_display_width = v;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "date_format")? {
        cfg_options.date_format = v;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "time_format")? {
        cfg_options.time_format = v;
    }
    if let Some(v) = extract_optional_attr::<i32>(obj, "offset_utc_seconds")? {
        cfg_options.offset_utc_seconds = v;
    }
    if let Some(v) = extract_optional_attr::<String>(obj, "record_order")? {
        cfg_options.record_order = parse_record_order(&v)?;
    }
    cfg_options.validate().map_err(map_export_error)?;

    Ok(Some(cfg_options))
}

fn parse_record_order(value: &str) -> PyResult<EnumRecordOrder> {
    match value {
        "original" => Ok(EnumRecordOrder::Original),
        "chronological" => Ok(EnumRecordOrder::Chronological),
        _ => Err(PyValueError::new_err(
            "options.record_order must be one of: 'original', 'chronological'.",
        )),
    }
}

fn extract_optional_attr<T>(obj: &Bound<'_, PyAny>, attr: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    if !obj.hasattr(attr)? {
        return Ok(None);
    }
    let val = obj.getattr(attr)?;
    if val.is_none() {
        return Ok(None);
    }
    Ok(Some(val.extract::<T>()?))
}

/// Dict key or attribute, whichever the object carries.
fn extract_optional_field_bound<'py>(
    obj: &Bound<'py, PyAny>,
    key: &str,
) -> PyResult<Option<Bound<'py, PyAny>>> {
    let val = match obj.downcast::<PyDict>() {
        Ok(dict) => dict.get_item(key)?,
        Err(_) if obj.hasattr(key)? => Some(obj.getattr(key)?),
        Err(_) => None,
    };
    Ok(val.filter(|v| !v.is_none()))
}

fn extract_optional_field<T>(obj: &Bound<'_, PyAny>, key: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    match extract_optional_field_bound(obj, key)? {
        Some(val) => Ok(Some(val.extract::<T>()?)),
        None => Ok(None),
    }
}

fn extract_first_field<T>(obj: &Bound<'_, PyAny>, keys: &[&str]) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    for key in keys {
        if let Some(val) = extract_optional_field::<T>(obj, key)? {
            return Ok(Some(val));
        }
    }
    Ok(None)
}

#[pymodule]
fn _recordkit_export_xlsx_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(export_records_xlsx, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
