use super::*;
use crate::xmp::ProfileId;

/// DDR3-1600 11-11-11-28, 1.35V capable, with one XMP profile (DDR3-2000).
fn sample() -> Vec<u8>
{
	let mut data = vec![0u8; 256];
	data[0x00] = 0x92;
	data[0x02] = 0x0B;
	data[0x06] = 0b010; // 1.35V, 1.5V operable
	data[0x0C] = 10; // 1.25 ns
	data[0x0E] = 0xFC; // CL 6-11
	data[0x0F] = 0x00;
	data[0x10] = 110; // tCL 13.75 ns
	data[0x11] = 120; // tWR 15 ns
	data[0x12] = 110; // tRCD
	data[0x13] = 48; // tRRD 6 ns
	data[0x14] = 110; // tRP
	data[0x15] = 0x11;
	data[0x16] = 0x18; // tRAS 35 ns
	data[0x17] = 0x86; // tRC 48.75 ns
	data[0x18] = 0x00;
	data[0x19] = 0x05; // tRFC 160 ns
	data[0x1A] = 60; // tWTR 7.5 ns
	data[0x1B] = 60; // tRTP
	data[0x1C] = 0xA1; // high nibble not modeled
	data[0x1D] = 0x40; // tFAW 40 ns

	let xmp = &mut data[XMP_START..];
	xmp[0] = 0x0C;
	xmp[1] = 0x4A;
	xmp[2] = 0x05; // profile 1, 1 DIMM per channel
	xmp[3] = 0x12;
	xmp[4] = 1;
	xmp[5] = 8;
	xmp[6] = 1;
	xmp[7] = 12;
	let p = &mut xmp[9..9 + 35];
	p[0] = 0x2D; // 1.65V
	p[1] = 8; // 1 ns
	p[2] = 72; // tCL 9
	p[3] = 0xE0; // CL 9-11
	p[4] = 0x01; // CL 12
	p[5] = 56; // tCWL 7
	p[6] = 88; // tRP 11
	p[7] = 80; // tRCD 10
	data
}

#[test]
fn too_short()
{
	match SpdImage::read(&[0u8; 127])
	{
		Err(ReadError::Underflow{need: 128, have: 127}) => (),
		r => panic!("unexpected result {r:?}"),
	}
	// a bare 128-byte image just has no XMP
	let spd = SpdImage::read(&sample()[..SIZE]).unwrap();
	assert!(spd.xmp().is_none());
	assert_eq!(spd.encode().len(), SIZE);
}

#[test]
fn decode()
{
	let spd = SpdImage::read(&sample()).unwrap();
	assert!(!spd.voltage(Voltage::V1_25));
	assert!(spd.voltage(Voltage::V1_35));
	assert!(spd.voltage(Voltage::V1_50));
	assert_eq!(spd.cl_support().iter().collect::<Vec<_>>(), vec![6, 7, 8, 9, 10, 11]);
	assert!((spd.period_ns() - 1.25).abs() < 1e-12);
	assert!((spd.frequency() - 800.0).abs() < 1e-9);
	let timings: Vec<_> = spd.timings().map(|(t, v)| (t.name(), v)).collect();
	assert_eq!(timings, vec![
		("tCL", 11), ("tRCD", 11), ("tRP", 11), ("tRAS", 28), ("tRC", 39), ("tRFC", 128),
		("tRRD", 5), ("tFAW", 32), ("tWR", 12), ("tWTR", 6), ("tRTP", 6),
	]);
	assert!((spd.timing_ns(Timing::Rfc) - 160.0).abs() < 1e-12);
	assert!(spd.xmp().is_some());
}

#[test]
fn reencode_unmodified()
{
	let data = sample();
	let spd = SpdImage::read(&data).unwrap();
	let out = spd.encode();
	assert_eq!(out.len(), data.len());
	assert_eq!(out[..CRC_LOW], data[..CRC_LOW]);
	assert_eq!(out[CRC_HIGH + 1..], data[CRC_HIGH + 1..]);
	let crc = crc16::checksum(&data[..CRC_LEN]);
	assert_eq!(out[CRC_LOW], crc as u8);
	assert_eq!(out[CRC_HIGH], (crc >> 8) as u8);
	assert_eq!(spd.checksum(), crc);

	// arbitrary bytes, including reserved bits in shared bytes and a valid XMP header
	let mut state = 0x2545F491u32;
	let mut noise: Vec<u8> = (0..256).map(|_|
	{
		state ^= state << 13;
		state ^= state >> 17;
		state ^= state << 5;
		state as u8
	}).collect();
	noise[XMP_START] = 0x0C;
	noise[XMP_START + 1] = 0x4A;
	noise[XMP_START + 2] |= 0x03;
	let spd = SpdImage::read(&noise).unwrap();
	assert!(spd.xmp().is_some());
	let out = spd.encode();
	assert_eq!(out[..CRC_LOW], noise[..CRC_LOW]);
	assert_eq!(out[CRC_HIGH + 1..], noise[CRC_HIGH + 1..]);
}

#[test]
fn voltage_flags()
{
	let mut data = sample();
	data[VOLTAGE] = 0xF9; // not 1.5V operable, reserved bits set
	let mut spd = SpdImage::read(&data).unwrap();
	assert!(!spd.voltage(Voltage::V1_50));
	spd.set_voltage(Voltage::V1_50, true);
	assert!(spd.voltage(Voltage::V1_50));
	assert_eq!(spd.encode()[VOLTAGE], 0xF8);
	spd.set_voltage(Voltage::V1_25, true);
	spd.set_voltage(Voltage::V1_35, false);
	assert_eq!(spd.encode()[VOLTAGE], 0xFC);
	assert_eq!("1.35V".parse::<Voltage>(), Ok(Voltage::V1_35));
	assert_eq!("1.2v".parse::<Voltage>(), Err(UnknownVoltage("1.2v".to_owned())));
}

#[test]
fn cl_support()
{
	let mut spd = SpdImage::read(&sample()).unwrap();
	let before = spd.cl_support();
	assert_eq!(spd.set_cl_supported(19, true), Err(RangeError::UnsupportedCl(19)));
	assert_eq!(spd.cl_supported(19), Err(RangeError::UnsupportedCl(19)));
	assert_eq!(spd.cl_support(), before);
	assert_eq!(spd.set_cl_supported(11, true), Ok(()));
	assert_eq!(spd.cl_supported(11), Ok(true));
	spd.set_cl_supported(4, true).unwrap();
	spd.set_cl_supported(13, true).unwrap();
	spd.set_cl_supported(6, false).unwrap();
	let out = spd.encode();
	assert_eq!(out[CL_LOW], 0xF9);
	assert_eq!(out[CL_HIGH], 0x02);
}

#[test]
fn frequency_and_timings()
{
	let mut spd = SpdImage::read(&sample()).unwrap();
	spd.set_frequency(800.0).unwrap();
	spd.set_timing(Timing::Cl, 10).unwrap();
	assert_eq!(spd.timing(Timing::Cl), 10);
	assert_eq!(spd.cl_supported(10), Ok(true));

	spd.set_frequency(933.0).unwrap();
	for (t, ticks) in [(Timing::Cl, 13), (Timing::Rcd, 13), (Timing::Rp, 13), (Timing::Ras, 32), (Timing::Rc, 45), (Timing::Rfc, 150), (Timing::Faw, 30), (Timing::Wtr, 7)]
	{
		spd.set_timing(t, ticks).unwrap();
		assert_eq!(spd.timing(t), ticks, "{t}");
	}
	let reread = SpdImage::read(&spd.encode()).unwrap();
	assert_eq!(reread.timings().collect::<Vec<_>>(), spd.timings().collect::<Vec<_>>());
}

#[test]
fn exact_periods()
{
	let mut data = sample();
	data[TCK] = 7;
	data[TCK_FINE] = 63; // 0.938 ns
	let spd = SpdImage::read(&data).unwrap();
	assert_eq!(spd.period_ns(), 0.9375);
	assert!((spd.frequency() - 1066.6667).abs() < 1e-3);

	data[TCK] = 8;
	data[TCK_FINE] = 71; // 1.071 ns
	let mut spd = SpdImage::read(&data).unwrap();
	assert!((spd.frequency() - 933.3333).abs() < 1e-3);
	// the refined period also drives the tick conversion
	spd.set_timing(Timing::Cl, 11).unwrap();
	assert_eq!(spd.encode()[0x10], 94);
	assert_eq!(spd.encode()[0x23], 36);
	assert_eq!(spd.timing(Timing::Cl), 11);
}

#[test]
fn negative_corrections()
{
	let mut data = sample();
	data[TCK] = 0x08;
	data[TCK_FINE] = 0xC2; // -62 ps
	let spd = SpdImage::read(&data).unwrap();
	assert_eq!(spd.period_ns(), 0.9375);
	assert!((spd.frequency() - 1066.6667).abs() < 1e-3);

	data[TCK] = 0x09;
	data[TCK_FINE] = 0xCA; // -54 ps
	data[0x10] = 112;
	data[0x23] = 0xB8; // tCL 14 ns - 72 ps
	let spd = SpdImage::read(&data).unwrap();
	assert!((spd.frequency() - 933.3333).abs() < 1e-3);
	assert!((spd.timing_ns(Timing::Cl) - 13.928).abs() < 1e-9);
	assert_eq!(spd.timing(Timing::Cl), 13);
	let out = spd.encode();
	assert_eq!([out[TCK_FINE], out[0x23]], [0xCA, 0xB8]);
	assert_eq!(out[..CRC_LOW], data[..CRC_LOW]);
}

#[test]
fn scaled_frequency()
{
	let mut spd = SpdImage::read(&sample()).unwrap();
	let cycles: Vec<_> = spd.timings().collect();
	spd.set_frequency_scaled(933.0).unwrap();
	assert!((spd.frequency() - 1000.0 / 1.072).abs() < 1e-9);
	assert_eq!(spd.timings().collect::<Vec<_>>(), cycles);
	assert_eq!(SpdImage::read(&spd.encode()).unwrap().timings().collect::<Vec<_>>(), cycles);

	// 11 cycles of 3.333 ns overflow the tCL byte, so nothing may change
	let before = spd.encode();
	assert_eq!(spd.set_frequency_scaled(300.0), Err(RangeError::Overflow{value: 293, max: 0xFF}));
	assert_eq!(spd.encode(), before);
	assert!((spd.frequency() - 1000.0 / 1.072).abs() < 1e-9);

	// plain frequency changes keep nanoseconds instead
	let mut spd = SpdImage::read(&sample()).unwrap();
	spd.set_frequency(400.0).unwrap();
	assert_eq!(spd.timing(Timing::Rcd), 6); // 13.75 ns at 2.5 ns
}

#[test]
fn bulk_timings()
{
	let mut spd = SpdImage::read(&sample()).unwrap();
	let before = spd.encode();
	assert_eq!(spd.set_timings([(Timing::Rcd, 10), (Timing::Cl, 13), (Timing::Rrd, 300)]), Err(RangeError::Overflow{value: 3000, max: 0xFF}));
	assert_eq!(spd.encode(), before);
	assert_eq!(spd.cl_supported(13), Ok(false));

	spd.set_timings([(Timing::Rcd, 10), (Timing::Cl, 13)]).unwrap();
	assert_eq!(spd.timing(Timing::Rcd), 10);
	assert_eq!(spd.timing(Timing::Cl), 13);
	assert_eq!(spd.cl_supported(13), Ok(true));
}

#[test]
fn rejected_timings()
{
	let mut spd = SpdImage::read(&sample()).unwrap();
	let before = spd.encode();
	assert_eq!(spd.set_timing(Timing::Rcd, 0), Err(RangeError::ZeroTicks));
	assert_eq!(spd.set_timing(Timing::Cl, 19), Err(RangeError::UnsupportedCl(19)));
	assert_eq!(spd.set_timing(Timing::Cl, 3), Err(RangeError::UnsupportedCl(3)));
	// 256 cycles of 1.25 ns do not fit the 8-bit tRRD field
	assert_eq!(spd.set_timing(Timing::Rrd, 256), Err(RangeError::Overflow{value: 2560, max: 0xFF}));
	assert_eq!(spd.encode(), before);
	assert!(spd.set_frequency(0.0).is_err());
	assert!(spd.set_frequency(f64::NAN).is_err());
	assert!(spd.set_frequency(10_000.0).is_err());
	assert_eq!(spd.encode(), before);
	assert_eq!("tCWL".parse::<Timing>(), Err(UnknownTiming("tCWL".to_owned())));
}

#[test]
fn bad_xmp_header()
{
	let mut data = sample();
	data[XMP_START + 1] = 0x4B;
	let spd = SpdImage::read(&data).unwrap();
	assert!(spd.xmp().is_none());
	assert_eq!(spd.encode()[XMP_START..], data[XMP_START..]);
}

#[test]
fn xmp_edits_reach_image()
{
	let mut spd = SpdImage::read(&sample()).unwrap();
	let profile = spd.xmp_mut().unwrap().profile_mut(ProfileId::First).unwrap();
	profile.set_voltage(150).unwrap();
	profile.set_timing(crate::xmp::profile::Timing::Cl, 10).unwrap();
	let out = spd.encode();
	assert_eq!(out[XMP_START + 9], 0x2A);
	assert_eq!(out[XMP_START + 11], 80);
	// the checksum only covers the base section
	assert_eq!(spd.checksum(), crc16::checksum(&sample()[..CRC_LEN]));
}
