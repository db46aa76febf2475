//! Example: Build a small recording dataset, query it and checksum it
//!
//! Run with: cargo run --example basic_dataset

use jbof::{CompressionMethod, DataSet, Metadata, Tensor};
use ndarray::{Array1, Array2};
use serde_json::{json, Value};

fn object(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

fn main() -> anyhow::Result<()> {
    println!("JBOF Example: Recording Dataset");
    println!("===============================\n");

    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().join("recordings");
    println!("Creating dataset at: {}", root.display());

    let ds = DataSet::create(
        &root,
        object(json!({"samplerate": 16000, "corpus": "demo"})),
        Some("{speaker}_{take}"),
    )?;
    println!("✓ Dataset created\n");

    for (speaker, take) in [("anna", 1), ("anna", 2), ("bob", 1)] {
        let item = ds.add_item(None, object(json!({"speaker": speaker, "take": take})))?;

        let samples = Array1::from_shape_fn(16000, |i| {
            (i as f32 * 440.0 * std::f32::consts::TAU / 16000.0).sin() * take as f32
        });
        item.add_array("signal", &Tensor::from(samples.into_dyn()), object(json!({"unit": "Pa"})))?;

        let spectrum = Array2::<f64>::zeros((64, 250));
        item.add_array_with_format(
            "spectrum",
            &Tensor::from(spectrum.into_dyn()),
            Metadata::new(),
            &format!("npy.{}", CompressionMethod::Zstd.extension()),
        )?;
        println!("  added item {}", item.name());
    }
    println!();

    println!("Items by anna:");
    for item in ds.find_items(&object(json!({"speaker": "anna"})))? {
        let signal = item.array("signal")?;
        println!(
            "  {}: {} {:?} ({})",
            item.name(),
            signal.tensor.data_type(),
            signal.tensor.shape(),
            signal.metadata["unit"]
        );
    }
    println!();

    let report = ds.scan()?;
    println!("Scan: {}", report.summary());
    println!("Checksum: {}", ds.checksum()?);

    ds.delete_item("bob_1")?;
    println!("\nAfter deleting bob_1: {} items", ds.all_items()?.count());
    println!("Checksum: {}", ds.checksum()?);

    Ok(())
}
