use crc::{Crc, Digest, CRC_16_XMODEM};

/// CRC-16/XMODEM: polynomial 0x1021, initial value 0, MSB first, no final xor.
pub static XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

pub struct Crc16(Digest<'static, u16>);

impl Crc16
{
	pub fn new() -> Self
	{
		Self(XMODEM.digest())
	}
	
	pub fn update(&mut self, value: u8)
	{
		self.0.update(&[value]);
	}
	
	pub fn update_slice(&mut self, value: &[u8])
	{
		self.0.update(value);
	}
	
	pub fn get_value(&self) -> u16
	{
		self.0.clone().finalize()
	}
}

impl Default for Crc16
{
	fn default() -> Self
	{
		Self::new()
	}
}

pub fn checksum(data: &[u8]) -> u16
{
	XMODEM.checksum(data)
}
