//! Read command implementation

use fvflash_core::programmer::SpiMaster;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Default chunk size for reading (4 KiB)
const READ_CHUNK_SIZE: usize = 4096;

/// Run the read command
pub fn run_read(
    master: &mut dyn SpiMaster,
    output: &Path,
    start: u32,
    length: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    start
        .checked_add(length)
        .ok_or("Read range exceeds the 32-bit address space")?;

    let data = read_flash_with_progress(master, start, length as usize)?;

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!("Wrote {} bytes to {:?}", data.len(), output);

    Ok(())
}

/// Read a range of flash with a progress bar
pub fn read_flash_with_progress(
    master: &mut dyn SpiMaster,
    start: u32,
    length: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut data = vec![0u8; length];

    let pb = ProgressBar::new(length as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let mut offset = 0usize;
    while offset < length {
        let chunk_size = std::cmp::min(READ_CHUNK_SIZE, length - offset);
        let chunk = &mut data[offset..offset + chunk_size];

        master.read(start + offset as u32, chunk)?;

        offset += chunk_size;
        pb.set_position(offset as u64);
    }

    pb.finish_with_message("Read complete");
    Ok(data)
}
