//! Probe command implementation

use fvflash_core::programmer::SpiMaster;
use fvflash_core::protocol::spi25;

/// Identify the chip behind a programmer using its JEDEC ID
pub fn run_probe(master: &mut dyn SpiMaster) -> Result<(), Box<dyn std::error::Error>> {
    let caps = master.capabilities();
    log::debug!(
        "Programmer {}: max read {} bytes, max write {} bytes, features {:?}",
        caps.name,
        caps.max_data_read,
        caps.max_data_write,
        caps.features
    );

    let (manufacturer, device) = spi25::read_jedec_id(master)?;

    // A floating or missing chip reads back as all ones or all zeros
    if (manufacturer == 0xFF && device == 0xFFFF) || (manufacturer == 0x00 && device == 0x0000) {
        return Err(format!(
            "No flash chip found (JEDEC ID {:02X} {:04X})",
            manufacturer, device
        )
        .into());
    }

    let status = spi25::read_status1(master)?;

    println!("Found flash chip:");
    println!("  JEDEC ID: {:02X} {:04X}", manufacturer, device);
    println!("  Status:   0x{:02X}", status);
    println!("  Via:      {}", caps.name);

    Ok(())
}
