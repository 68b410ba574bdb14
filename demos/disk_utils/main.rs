//! Apple II disk image and `ShrinkIt` archive utility
//!
//! A command-line front end over the `a2vault-rs` engine.
//!
//! # Features
//!
//! - **info**: Show the volume or archive summary and any diagnostics
//! - **list**: List every entry (table, JSON or CSV)
//! - **extract**: Extract files from a disk image
//! - **dump**: Hex dump the start of one file
//! - **format**: Create a blank `ProDOS` volume
//! - **add** / **mkdir** / **delete** / **rename**: Edit a `ProDOS` volume in place
//! - **pack**: Build a `NuFX` archive from host files or disk images
//! - **unpack**: Extract every record of a `NuFX` archive
//!
//! Edits are written through a temporary file and renamed over the image, so a
//! failed command never leaves a half-written image behind.
//!
//! # Usage Examples
//!
//! ```bash
//! # Summary of a disk image
//! cargo run --example disk_utils -- info games.dsk
//!
//! # Catalog as JSON
//! cargo run --example disk_utils -- list work.po --format json
//!
//! # Make a blank 800K volume and copy a file into a subdirectory
//! cargo run --example disk_utils -- format blank.po --blocks 1600 --name WORK
//! cargo run --example disk_utils -- mkdir blank.po SRC
//! cargo run --example disk_utils -- add blank.po notes.txt --dir SRC --type 04
//!
//! # Archive the volume, then unpack it elsewhere with strict CRC checks
//! cargo run --example disk_utils -- pack backup.shk blank.po --disk-image
//! A2VAULT_CRC_POLICY=strict cargo run --example disk_utils -- unpack backup.shk -o out/
//! ```

use std::{
	fs,
	path::{Path, PathBuf},
};

use a2vault_rs::prelude::{
	file::{nufx, prodos},
	*,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "disk_utils")]
#[command(author = "a2vault-rs project")]
#[command(version = "1.0")]
#[command(about = "Apple II disk image and NuFX archive utility", long_about = None)]
struct Cli {
	/// CRC mismatch handling: warn or strict
	#[arg(long, global = true, env = "A2VAULT_CRC_POLICY", default_value = "warn")]
	crc_policy: CrcPolicy,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Show volume or archive information
	Info {
		/// Disk image or archive
		#[arg(value_name = "INPUT")]
		input: PathBuf,

		/// Print every diagnostic
		#[arg(short, long)]
		diagnostics: bool,
	},

	/// List entries
	List {
		/// Disk image or archive
		#[arg(value_name = "INPUT")]
		input: PathBuf,

		/// Sort order
		#[arg(short, long, value_enum, default_value = "disk")]
		sort: SortOrder,

		/// Output format
		#[arg(short, long, value_enum, default_value = "table")]
		format: OutputFormat,

		/// Only list paths containing this text (case-insensitive)
		#[arg(long, value_name = "TEXT")]
		filter: Option<String>,
	},

	/// Extract files from a disk image
	Extract {
		/// Disk image
		#[arg(value_name = "IMAGE")]
		input: PathBuf,

		/// Paths to extract (slash separated)
		#[arg(value_name = "PATHS")]
		files: Vec<String>,

		/// Extract every file
		#[arg(short, long)]
		all: bool,

		/// Output directory
		#[arg(short, long, value_name = "DIR", default_value = ".")]
		output: PathBuf,
	},

	/// Hex dump the start of a file
	Dump {
		/// Disk image
		#[arg(value_name = "IMAGE")]
		input: PathBuf,

		/// Path of the file
		#[arg(value_name = "PATH")]
		path: String,

		/// Number of bytes to show
		#[arg(short, long, default_value = "256")]
		length: usize,
	},

	/// Create a blank ProDOS volume
	Format {
		/// Image to create
		#[arg(value_name = "OUTPUT")]
		output: PathBuf,

		/// Volume size in 512-byte blocks
		#[arg(short, long, default_value = "280")]
		blocks: usize,

		/// Volume name
		#[arg(short, long, default_value = "BLANK")]
		name: String,

		/// Replace an existing file
		#[arg(long)]
		force: bool,
	},

	/// Copy a host file onto a ProDOS volume
	Add {
		/// ProDOS image
		#[arg(value_name = "IMAGE")]
		input: PathBuf,

		/// Host file to copy
		#[arg(value_name = "FILE")]
		file: PathBuf,

		/// Target directory on the volume
		#[arg(short, long, default_value = "/")]
		dir: String,

		/// ProDOS name (defaults to the host file name)
		#[arg(short, long)]
		name: Option<String>,

		/// File type in hex
		#[arg(short = 't', long = "type", default_value = "06", value_parser = parse_hex_u8)]
		file_type: u8,

		/// Auxiliary type in hex
		#[arg(long = "aux", default_value = "0000", value_parser = parse_hex_u16)]
		aux_type: u16,
	},

	/// Create a subdirectory on a ProDOS volume
	Mkdir {
		/// ProDOS image
		#[arg(value_name = "IMAGE")]
		input: PathBuf,

		/// Path of the new directory
		#[arg(value_name = "PATH")]
		path: String,
	},

	/// Delete a file from a ProDOS volume
	Delete {
		/// ProDOS image
		#[arg(value_name = "IMAGE")]
		input: PathBuf,

		/// Path of the file
		#[arg(value_name = "PATH")]
		path: String,
	},

	/// Rename a file or directory on a ProDOS volume
	Rename {
		/// ProDOS image
		#[arg(value_name = "IMAGE")]
		input: PathBuf,

		/// Current path
		#[arg(value_name = "PATH")]
		path: String,

		/// New name (last component only)
		#[arg(value_name = "NAME")]
		new_name: String,
	},

	/// Build a NuFX archive
	Pack {
		/// Archive to create
		#[arg(value_name = "OUTPUT")]
		output: PathBuf,

		/// Host files to archive
		#[arg(value_name = "FILES", required = true)]
		files: Vec<PathBuf>,

		/// Store the inputs as disk images
		#[arg(long)]
		disk_image: bool,

		/// Store threads uncompressed
		#[arg(long)]
		no_compress: bool,
	},

	/// Extract every record of a NuFX archive
	Unpack {
		/// Archive
		#[arg(value_name = "ARCHIVE")]
		input: PathBuf,

		/// Output directory
		#[arg(short, long, value_name = "DIR", default_value = ".")]
		output: PathBuf,

		/// Also write resource forks as NAME.rsrc
		#[arg(long)]
		resource_forks: bool,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortOrder {
	/// On-disk order
	Disk,
	/// By path
	Name,
	/// By size
	Size,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
	/// Table format
	Table,
	/// JSON format
	Json,
	/// CSV format
	Csv,
}

/// One listed entry
#[derive(Debug, Serialize)]
struct ListedEntry {
	path: String,
	kind: &'static str,
	file_type: String,
	aux_type: String,
	size: usize,
	blocks: usize,
	locked: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	modified: Option<String>,
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
	u8::from_str_radix(s.trim_start_matches('$'), 16).map_err(|e| format!("'{}': {}", s, e))
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
	u16::from_str_radix(s.trim_start_matches('$'), 16).map_err(|e| format!("'{}': {}", s, e))
}

/// Loads and parses a disk image
fn open_catalog(input: &Path, options: &ReadOptions) -> Result<Catalog> {
	let data = read_image(input).with_context(|| format!("Failed to read {}", input.display()))?;
	Catalog::from_bytes_with(&data, options).with_context(|| format!("Failed to parse {}", input.display()))
}

/// Loads and parses an archive
fn open_archive(input: &Path, options: &ReadOptions) -> Result<NuFxArchive> {
	let data = read_image(input).with_context(|| format!("Failed to read {}", input.display()))?;
	NuFxArchive::from_bytes_with(&data, options).with_context(|| format!("Failed to parse {}", input.display()))
}

fn print_diagnostics(diagnostics: &Diagnostics, all: bool) {
	if diagnostics.is_empty() {
		return;
	}
	if all {
		println!("\n=== Diagnostics ===");
		for diagnostic in diagnostics {
			println!("  {}", diagnostic);
		}
	} else {
		println!(
			"\n⚠ {} warning(s); rerun with --diagnostics for details",
			diagnostics.warning_count()
		);
	}
}

fn format_date(date: Option<chrono::NaiveDateTime>) -> String {
	date.map_or_else(|| "-".to_string(), |d| d.format("%d-%b-%y %H:%M").to_string())
}

/// Handles the 'info' command
fn handle_info(input: &Path, diagnostics: bool, options: &ReadOptions) -> Result<()> {
	let data = read_image(input)?;

	if nufx::is_nufx(&data) {
		let archive = NuFxArchive::from_bytes_with(&data, options)?;
		println!("\n=== NuFX Archive ===");
		println!("Wrapped in Binary II: {}", if archive.binary_ii { "yes" } else { "no" });
		println!("Records: {}", archive.master.total_records);
		println!("Master Version: {}", archive.master.version);
		println!("Created: {}", format_date(archive.master.created));
		println!("Modified: {}", format_date(archive.master.modified));
		println!("Size: {} bytes", data.len());
		print_diagnostics(&archive.diagnostics, diagnostics);
		return Ok(());
	}

	let catalog = Catalog::from_bytes_with(&data, options)?;
	println!("\n=== Volume Information ===");
	println!("Name: {}", catalog.disk_name);
	println!("Format: {}", catalog.disk_format);
	println!("Order: {}", catalog.addressing);
	println!("Size: {} bytes ({} blocks)", catalog.disk_size, catalog.disk_size / BLOCK_SIZE);
	println!("Files: {}", catalog.file_count());

	if catalog.disk_format == DiskFormat::ProDos {
		let info = prodos::volume_info(&data)?;
		println!("Created: {}", format_date(info.created));
		println!("Free Blocks: {} / {}", info.free_blocks, info.total_blocks);
		println!(
			"Utilization: {:.1}%",
			(info.total_blocks - info.free_blocks) as f64 / info.total_blocks as f64 * 100.0
		);
	}

	print_diagnostics(&catalog.diagnostics, diagnostics);
	Ok(())
}

fn catalog_rows(catalog: &Catalog) -> Vec<ListedEntry> {
	catalog
		.walk()
		.map(|(path, entry)| ListedEntry {
			path,
			kind: if entry.is_directory() { "dir" } else { "file" },
			file_type: format!("${:02X}", entry.file_type),
			aux_type: format!("${:04X}", entry.aux_type),
			size: entry.size,
			blocks: entry.blocks_used,
			locked: entry.locked,
			modified: entry.modified.map(|d| d.to_string()),
		})
		.collect()
}

fn archive_rows(archive: &NuFxArchive) -> Vec<ListedEntry> {
	archive
		.records
		.iter()
		.map(|record| {
			let role = if record.is_disk_image() {
				ThreadRole::DiskImage
			} else {
				ThreadRole::DataFork
			};
			let size = record.thread(role).and_then(|thread| record.uncompressed_len(thread).ok()).unwrap_or(0);
			let packed: usize = record.threads.iter().map(|t| t.payload.len()).sum();
			ListedEntry {
				path: record.filename.clone(),
				kind: if record.is_disk_image() { "disk" } else { "file" },
				file_type: format!("${:02X}", record.file_type),
				aux_type: format!("${:04X}", record.aux_type),
				size,
				blocks: packed.div_ceil(BLOCK_SIZE),
				locked: record.access & 0xC2 != 0xC2,
				modified: record.modified.map(|d| d.to_string()),
			}
		})
		.collect()
}

/// Handles the 'list' command
fn handle_list(
	input: &Path,
	sort: SortOrder,
	format: OutputFormat,
	filter: Option<String>,
	options: &ReadOptions,
) -> Result<()> {
	let data = read_image(input)?;
	let (title, mut rows, diagnostics) = if nufx::is_nufx(&data) {
		let archive = NuFxArchive::from_bytes_with(&data, options)?;
		(format!("NuFX archive {}", input.display()), archive_rows(&archive), archive.diagnostics)
	} else {
		let catalog = Catalog::from_bytes_with(&data, options)?;
		let title = format!("{} volume {}", catalog.disk_format, catalog.disk_name);
		(title, catalog_rows(&catalog), catalog.diagnostics)
	};

	if let Some(filter) = filter {
		let needle = filter.to_ascii_lowercase();
		rows.retain(|row| row.path.to_ascii_lowercase().contains(&needle));
	}
	match sort {
		SortOrder::Disk => {}
		SortOrder::Name => rows.sort_by(|a, b| a.path.cmp(&b.path)),
		SortOrder::Size => rows.sort_by(|a, b| b.size.cmp(&a.size)),
	}

	match format {
		OutputFormat::Table => {
			println!("\n{}", title);
			println!("{:<32} {:>5} {:>5} {:>7} {:>9} {:>6}  Modified", "Path", "Kind", "Type", "Aux", "Size", "Blocks");
			println!("{}", "-".repeat(88));
			for row in &rows {
				println!(
					"{:<32} {:>5} {:>5} {:>7} {:>9} {:>6}  {}{}",
					row.path,
					row.kind,
					row.file_type,
					row.aux_type,
					row.size,
					row.blocks,
					row.modified.as_deref().unwrap_or("-"),
					if row.locked { " *" } else { "" }
				);
			}
			println!("{}", "-".repeat(88));
			println!("{} entries", rows.len());
			print_diagnostics(&diagnostics, false);
		}
		OutputFormat::Json => {
			println!("{}", serde_json::to_string_pretty(&rows)?);
		}
		OutputFormat::Csv => {
			println!("path,kind,file_type,aux_type,size,blocks,locked,modified");
			for row in &rows {
				println!(
					"\"{}\",{},{},{},{},{},{},{}",
					row.path.replace('"', "\"\""),
					row.kind,
					row.file_type,
					row.aux_type,
					row.size,
					row.blocks,
					row.locked,
					row.modified.as_deref().unwrap_or("")
				);
			}
		}
	}
	Ok(())
}

/// Writes one extracted file below `output`, recreating its directory path
fn write_extracted(output: &Path, path: &str, data: &[u8]) -> Result<PathBuf> {
	let mut target = output.to_path_buf();
	for component in path.split(['/', ':']).filter(|c| !c.is_empty() && *c != "..") {
		target.push(component);
	}
	if let Some(parent) = target.parent() {
		fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
	}
	fs::write(&target, data).with_context(|| format!("Failed to write {}", target.display()))?;
	Ok(target)
}

/// Handles the 'extract' command
fn handle_extract(input: &Path, files: Vec<String>, all: bool, output: &Path, options: &ReadOptions) -> Result<()> {
	if !all && files.is_empty() {
		bail!("Specify paths to extract or use --all");
	}
	let catalog = open_catalog(input, options)?;

	let selected: Vec<(String, &CatalogEntry)> = if all {
		catalog.walk().filter(|(_, entry)| !entry.is_directory()).collect()
	} else {
		let mut selected = Vec::with_capacity(files.len());
		for path in files {
			let entry = catalog.find(&path).with_context(|| format!("'{}' not found", path))?;
			if entry.is_directory() {
				bail!("'{}' is a directory", path);
			}
			selected.push((path, entry));
		}
		selected
	};

	for (path, entry) in &selected {
		let data = entry.data().unwrap_or_default();
		let target = write_extracted(output, path, data)?;
		println!("  {} -> {} ({} bytes)", path, target.display(), data.len());
		if let Some(fork) = entry.resource_fork() {
			let target = write_extracted(output, &format!("{}.rsrc", path), fork)?;
			println!("  {} [resource] -> {} ({} bytes)", path, target.display(), fork.len());
		}
	}
	println!("\n✓ Extracted {} file(s)", selected.len());
	print_diagnostics(&catalog.diagnostics, false);
	Ok(())
}

/// Handles the 'dump' command
fn handle_dump(input: &Path, path: &str, length: usize, options: &ReadOptions) -> Result<()> {
	let catalog = open_catalog(input, options)?;
	let entry = catalog.find(path).with_context(|| format!("'{}' not found", path))?;
	let data = entry.data().with_context(|| format!("'{}' is a directory", path))?;

	println!("{} (type ${:02X}, aux ${:04X}, {} bytes)", path, entry.file_type, entry.aux_type, data.len());
	for (row, chunk) in data[..length.min(data.len())].chunks(16).enumerate() {
		let ascii: String =
			chunk.iter().map(|&b| b & 0x7F).map(|b| if b.is_ascii_graphic() { char::from(b) } else { '.' }).collect();
		println!("{:06X}: {:<32}  {}", row * 16, hex::encode_upper(chunk), ascii);
	}
	Ok(())
}

/// Handles the 'format' command
fn handle_format(output: &Path, blocks: usize, name: &str, force: bool) -> Result<()> {
	if output.exists() && !force {
		bail!("{} already exists (use --force to replace it)", output.display());
	}
	let image = prodos::create_volume(blocks, name, &WriteOptions::default())?;
	persist_image(output, &image)?;
	println!("✓ Created /{} ({} blocks) at {}", name.to_ascii_uppercase(), blocks, output.display());
	Ok(())
}

/// Handles the 'add' command
fn handle_add(
	input: &Path,
	file: &Path,
	dir: &str,
	name: Option<String>,
	file_type: u8,
	aux_type: u16,
) -> Result<()> {
	let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
	let name = match name {
		Some(name) => name,
		None => file
			.file_stem()
			.and_then(|s| s.to_str())
			.map(str::to_string)
			.with_context(|| format!("Cannot derive a name from {}", file.display()))?,
	};

	let new_file = ProDosNewFile::new(&name, &data).with_type(file_type, aux_type);
	update_image(input, |buffer| prodos::add_file(buffer, dir, &new_file, &WriteOptions::default()))?;
	println!("✓ Added {} ({} bytes) to {}", name.to_ascii_uppercase(), data.len(), dir);
	Ok(())
}

/// Splits `a/b/c` into (`a/b`, `c`)
fn split_parent(path: &str) -> (&str, &str) {
	let path = path.trim_end_matches('/');
	match path.rfind('/') {
		Some(index) => (&path[..index], &path[index + 1..]),
		None => ("", path),
	}
}

/// Handles the 'mkdir' command
fn handle_mkdir(input: &Path, path: &str) -> Result<()> {
	let (parent, name) = split_parent(path);
	update_image(input, |buffer| prodos::create_directory(buffer, parent, name, &WriteOptions::default()))?;
	println!("✓ Created directory {}", path);
	Ok(())
}

/// Handles the 'delete' command
fn handle_delete(input: &Path, path: &str) -> Result<()> {
	update_image(input, |buffer| prodos::delete_file(buffer, path))?;
	println!("✓ Deleted {}", path);
	Ok(())
}

/// Handles the 'rename' command
fn handle_rename(input: &Path, path: &str, new_name: &str) -> Result<()> {
	update_image(input, |buffer| prodos::rename(buffer, path, new_name))?;
	println!("✓ Renamed {} to {}", path, new_name.to_ascii_uppercase());
	Ok(())
}

/// Handles the 'pack' command
fn handle_pack(output: &Path, files: &[PathBuf], disk_image: bool, no_compress: bool) -> Result<()> {
	let mut contents = Vec::with_capacity(files.len());
	for file in files {
		let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
		let name = file
			.file_name()
			.and_then(|s| s.to_str())
			.with_context(|| format!("Cannot derive a name from {}", file.display()))?
			.to_string();
		contents.push((name, data));
	}

	let entries: Vec<NewArchiveEntry<'_>> = contents
		.iter()
		.map(|(name, data)| {
			if disk_image {
				NewArchiveEntry::disk_image(name, data)
			} else {
				NewArchiveEntry::new(name, data)
			}
		})
		.collect();

	let options = WriteOptions::default().with_compression(!no_compress);
	let archive = create_archive(&entries, &options)?;
	persist_image(output, &archive)?;

	let original: usize = contents.iter().map(|(_, data)| data.len()).sum();
	println!("✓ Packed {} record(s) into {}", entries.len(), output.display());
	if original > 0 {
		println!(
			"  {} -> {} bytes ({:.1}%)",
			original,
			archive.len(),
			archive.len() as f64 / original as f64 * 100.0
		);
	}
	Ok(())
}

/// Handles the 'unpack' command
fn handle_unpack(input: &Path, output: &Path, resource_forks: bool, options: &ReadOptions) -> Result<()> {
	let archive = open_archive(input, options)?;
	let mut diagnostics = Diagnostics::new();
	let mut written = 0usize;

	for record in &archive.records {
		let path = record.path_components().join("/");
		let role = if record.is_disk_image() {
			ThreadRole::DiskImage
		} else {
			ThreadRole::DataFork
		};
		let data = record
			.extract(role, options, &mut diagnostics)
			.with_context(|| format!("Failed to extract '{}'", record.filename))?
			.unwrap_or_default();
		let target = write_extracted(output, &path, &data)?;
		println!("  {} -> {} ({} bytes)", record.filename, target.display(), data.len());
		written += 1;

		if resource_forks
			&& let Some(fork) = record.extract(ThreadRole::ResourceFork, options, &mut diagnostics)?
		{
			let target = write_extracted(output, &format!("{}.rsrc", path), &fork)?;
			println!("  {} [resource] -> {} ({} bytes)", record.filename, target.display(), fork.len());
		}
	}

	println!("\n✓ Unpacked {} record(s)", written);
	diagnostics.extend(archive.diagnostics);
	print_diagnostics(&diagnostics, false);
	Ok(())
}

fn main() {
	env_logger::init_from_env(Env::default().default_filter_or("warn"));
	let cli = Cli::parse();
	let options = ReadOptions::default().with_crc_policy(cli.crc_policy);

	let result = match cli.command {
		Commands::Info {
			input,
			diagnostics,
		} => handle_info(&input, diagnostics, &options),
		Commands::List {
			input,
			sort,
			format,
			filter,
		} => handle_list(&input, sort, format, filter, &options),
		Commands::Extract {
			input,
			files,
			all,
			output,
		} => handle_extract(&input, files, all, &output, &options),
		Commands::Dump {
			input,
			path,
			length,
		} => handle_dump(&input, &path, length, &options),
		Commands::Format {
			output,
			blocks,
			name,
			force,
		} => handle_format(&output, blocks, &name, force),
		Commands::Add {
			input,
			file,
			dir,
			name,
			file_type,
			aux_type,
		} => handle_add(&input, &file, &dir, name, file_type, aux_type),
		Commands::Mkdir {
			input,
			path,
		} => handle_mkdir(&input, &path),
		Commands::Delete {
			input,
			path,
		} => handle_delete(&input, &path),
		Commands::Rename {
			input,
			path,
			new_name,
		} => handle_rename(&input, &path, &new_name),
		Commands::Pack {
			output,
			files,
			disk_image,
			no_compress,
		} => handle_pack(&output, &files, disk_image, no_compress),
		Commands::Unpack {
			input,
			output,
			resource_forks,
		} => handle_unpack(&input, &output, resource_forks, &options),
	};

	if let Err(e) = result {
		eprintln!("Error: {:#}", e);
		std::process::exit(1);
	}
}
