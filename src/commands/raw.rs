//! Raw transaction command implementation

use fvflash_core::programmer::SpiMaster;
use fvflash_core::spi::{AddressWidth, SpiCommand};

/// Clock out `write` (opcode first) and clock in `read_len` bytes
pub fn run_raw(
    master: &mut dyn SpiMaster,
    write: &[u8],
    read_len: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let (&opcode, data) = write
        .split_first()
        .ok_or("A raw transaction needs at least an opcode")?;

    let mut reply = vec![0u8; read_len];
    let mut cmd = SpiCommand {
        opcode,
        address: None,
        address_width: AddressWidth::None,
        write_data: data,
        read_buf: &mut reply,
    };
    master.execute(&mut cmd)?;

    println!("{}", hex_dump(&reply));
    Ok(())
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, line)| {
            let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
            format!("{:04x}: {}", i * 16, hex.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
