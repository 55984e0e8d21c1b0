use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::view::OperatorView;

pub fn save_operator_view(view: &OperatorView, filename: impl AsRef<Path>) -> std::io::Result<()> {
    let file = File::create(filename)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serde_json::to_writer(&mut writer, view)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?.flush()?;
    Ok(())
}

pub fn load_saved_operator_view(filename: impl AsRef<Path>) -> Result<OperatorView, Box<dyn Error>> {
    let path = filename.as_ref();
    let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let decoder = GzDecoder::new(file);
    let reader = BufReader::new(decoder);

    let view = serde_json::from_reader(reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(view)
}
