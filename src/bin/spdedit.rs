use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};
use clap::{ArgAction, Parser};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use spdedit::spd::{self, SpdImage, Voltage};
use spdedit::xmp::profile::{self, XmpProfile};
use spdedit::xmp::{Mtb, ProfileId};

macro_rules!print_err
{
	($err:ident, $($print:expr),+) =>
	{
		{
			use std::io::Write;
			let mut stderr = std::io::stderr().lock();
			let _ = write!(stderr, $($print),+);
			let _ = write!(stderr, ": {}\n", $err);
			for src in $err.chain().skip(1)
			{
				let _ = write!(stderr, "\tsource: {src}\n");
			}
		}
	};
}

/// Inspects a DDR3 SPD image and optionally writes an edited copy.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args
{
	/// SPD image to read (128 bytes or more)
	input: PathBuf,
	/// Where to save the edited image
	#[arg(short, long)]
	output: Option<PathBuf>,
	/// Apply edits to this XMP profile instead of the base image
	#[arg(short, long)]
	profile: Option<ProfileId>,
	/// Clock frequency in MHz (half the transfer rate)
	#[arg(short, long)]
	frequency: Option<f64>,
	/// Keep timings in nanoseconds across a frequency change instead of keeping their cycle counts
	#[arg(long)]
	keep_ns: bool,
	/// Timing in clock cycles, e.g. `tRCD=11`
	#[arg(long, value_name = "NAME=TICKS", value_parser = parse_assign::<u32>)]
	timing: Vec<(String, u32)>,
	/// Add or remove a supported CAS latency, e.g. `9=on`
	#[arg(long, value_name = "CL=on|off", value_parser = parse_assign::<Switch>)]
	cl: Vec<(String, Switch)>,
	/// Base image voltage flag, e.g. `1.35v=off`
	#[arg(long, value_name = "NAME=on|off", value_parser = parse_assign::<Switch>)]
	voltage: Vec<(String, Switch)>,
	/// XMP profile voltage in centivolts
	#[arg(long, value_name = "CENTIVOLTS")]
	xmp_voltage: Option<u16>,
	/// XMP profile time base in nanoseconds, e.g. `1/8`
	#[arg(long, value_name = "DIVIDEND/DIVISOR", value_parser = parse_mtb)]
	mtb: Option<Mtb>,
	/// More output, repeat for more detail
	#[arg(short, long, action = ArgAction::Count)]
	verbose: u8,
}

#[derive(Clone, Copy, Debug)]
struct Switch(bool);

impl std::str::FromStr for Switch
{
	type Err = String;

	fn from_str(value: &str) -> Result<Self, String>
	{
		match value
		{
			"on" => Ok(Self(true)),
			"off" => Ok(Self(false)),
			_ => Err(format!("expected `on` or `off`, got {value:?}")),
		}
	}
}

fn parse_assign<T: std::str::FromStr>(value: &str) -> Result<(String, T), String>
	where T::Err: std::fmt::Display
{
	let Some((name, rhs)) = value.split_once('=')
	else
	{
		return Err(format!("expected NAME=VALUE, got {value:?}"));
	};
	let rhs = rhs.parse::<T>().map_err(|e| format!("bad value for {name}: {e}"))?;
	Ok((name.trim().to_owned(), rhs))
}

fn parse_mtb(value: &str) -> Result<Mtb, String>
{
	let Some((dividend, divisor)) = value.split_once('/')
	else
	{
		return Err(format!("expected DIVIDEND/DIVISOR, got {value:?}"));
	};
	let dividend = dividend.trim().parse::<u8>().map_err(|e| format!("bad dividend: {e}"))?;
	let divisor = divisor.trim().parse::<u8>().map_err(|e| format!("bad divisor: {e}"))?;
	Ok(Mtb::new(dividend, divisor))
}

fn edit_image(spd: &mut SpdImage, args: &Args) -> anyhow::Result<()>
{
	if let Some(mhz) = args.frequency
	{
		if args.keep_ns {spd.set_frequency(mhz)?;}
		else {spd.set_frequency_scaled(mhz)?;}
	}
	for (cl, on) in &args.cl
	{
		spd.set_cl_supported(cl.parse().with_context(|| format!("bad CAS latency {cl:?}"))?, on.0)?;
	}
	for (name, on) in &args.voltage
	{
		spd.set_voltage(name.parse::<Voltage>()?, on.0);
	}
	let timings = args.timing.iter().map(|(name, ticks)| Ok((name.parse::<spd::Timing>()?, *ticks))).collect::<anyhow::Result<Vec<_>>>()?;
	spd.set_timings(timings).context("could not set timings")?;
	Ok(())
}

fn edit_profile(profile: &mut XmpProfile, args: &Args) -> anyhow::Result<()>
{
	if let Some(mtb) = args.mtb
	{
		profile.set_mtb(mtb)?;
	}
	if let Some(mhz) = args.frequency
	{
		if args.keep_ns {profile.set_frequency(mhz)?;}
		else {profile.set_frequency_scaled(mhz)?;}
	}
	for (cl, on) in &args.cl
	{
		profile.set_cl_supported(cl.parse().with_context(|| format!("bad CAS latency {cl:?}"))?, on.0)?;
	}
	if let Some(centivolts) = args.xmp_voltage
	{
		profile.set_voltage(centivolts)?;
	}
	let timings = args.timing.iter().map(|(name, ticks)| Ok((name.parse::<profile::Timing>()?, *ticks))).collect::<anyhow::Result<Vec<_>>>()?;
	profile.set_timings(timings).context("could not set timings")?;
	Ok(())
}

fn print_summary(spd: &SpdImage)
{
	println!("DDR3-{:.0} ({:.4} ns clock)", spd.frequency() * 2.0, spd.period_ns());
	let voltages: Vec<_> = Voltage::ALL.iter().filter(|&&v| spd.voltage(v)).map(|v| v.name()).collect();
	println!("  voltages: {}", voltages.join(", "));
	println!("  CAS latencies: {}", spd.cl_support());
	let timings: Vec<_> = spd.timings().map(|(t, v)| format!("{t}={v}")).collect();
	println!("  {}", timings.join(" "));

	let Some(xmp) = spd.xmp()
	else
	{
		println!("no XMP");
		return;
	};
	println!("XMP {}.{}", xmp.version() >> 4, xmp.version() & 0xF);
	for (id, p) in xmp.profiles()
	{
		let volts = p.voltage();
		println!("profile {id}: DDR3-{:.0} at {}.{:02}V, {} DIMM(s) per channel", p.frequency() * 2.0, volts / 100, volts % 100, xmp.dimms_per_channel(id));
		println!("  CAS latencies: {}", p.cl_support());
		let timings: Vec<_> = p.timings().map(|(t, v)| format!("{t}={v}")).collect();
		println!("  {}", timings.join(" "));
	}
}

fn run(args: &Args) -> anyhow::Result<()>
{
	let level = match args.verbose
	{
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	SimpleLogger::new().with_level(level).init()?;

	let data = fs::read(&args.input).with_context(|| format!("could not read {}", args.input.display()))?;
	let mut spd = SpdImage::read(&data).with_context(|| format!("could not decode {}", args.input.display()))?;
	match args.profile
	{
		None =>
		{
			if args.xmp_voltage.is_some() || args.mtb.is_some() {bail!("--xmp-voltage and --mtb need --profile");}
			edit_image(&mut spd, args)?;
		},
		Some(id) =>
		{
			if !args.voltage.is_empty() {bail!("--voltage only applies to the base image");}
			let profile = spd.xmp_mut().ok_or_else(|| anyhow!("image has no XMP block"))?
				.profile_mut(id).ok_or_else(|| anyhow!("XMP profile {id} is not enabled"))?;
			edit_profile(profile, args).with_context(|| format!("could not edit XMP profile {id}"))?;
		},
	}
	print_summary(&spd);

	if let Some(path) = &args.output
	{
		let crc = spd.save(path)?;
		println!("saved to {} (checksum 0x{crc:04X})", path.display());
	}
	Ok(())
}

pub fn main() -> ExitCode
{
	let args = Args::parse();
	match run(&args)
	{
		Ok(()) => ExitCode::SUCCESS,
		Err(e) =>
		{
			print_err!(e, "Error");
			ExitCode::FAILURE
		},
	}
}
