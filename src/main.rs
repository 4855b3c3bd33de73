use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vof::entity::{CloneData, Record};
use vof::header::{TlvHeader, HEADER_LEN};
use vof::resolve::read_pack_list_at;
use vof::scan::Scanner;

#[derive(Parser)]
#[command(name = "vof", about = "Inspect tape-backed versioned object (VOF) metadata files")]
struct Cli {
    /// Print decoded records as JSON, one object per line
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a metadata file and print every record
    Scan {
        input: PathBuf,
    },
    /// Scan a standalone data-pack file (block and pack-list records only)
    Packs {
        input: PathBuf,
    },
    /// Validate and print the record header at a byte offset
    Header {
        input: PathBuf,
        #[arg(short, long, default_value = "0")]
        offset: u64,
    },
    /// Read the pack-list record stored at a byte offset of a pack file
    Resolve {
        pack: PathBuf,
        #[arg(short, long)]
        offset: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { input } => {
            let scanner = Scanner::metadata(File::open(&input)?);
            scan_and_print(scanner, cli.json)?;
        }

        // ── Packs ────────────────────────────────────────────────────────────
        Commands::Packs { input } => {
            let scanner = Scanner::pack_file(File::open(&input)?);
            scan_and_print(scanner, cli.json)?;
        }

        // ── Header ───────────────────────────────────────────────────────────
        Commands::Header { input, offset } => {
            let mut file = File::open(&input)?;
            file.seek(SeekFrom::Start(offset))?;
            let header = TlvHeader::read(&mut file, offset)?
                .ok_or("end of stream at the requested offset")?;
            println!("  Offset     {offset}");
            println!("  Tag        {}", header.tag);
            println!("  Data len   {} B", header.data_len);
            println!("  Data hash  {:#018x}", header.data_hash);
            println!("  Payload    {}..{}", offset + HEADER_LEN as u64,
                     offset + HEADER_LEN as u64 + header.data_len);
        }

        // ── Resolve ──────────────────────────────────────────────────────────
        Commands::Resolve { pack, offset } => {
            let mut file = File::open(&pack)?;
            let list = read_pack_list_at(&mut file, offset)?;
            print_record(offset, &Record::PackList(list), cli.json);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn scan_and_print<R: Read>(
    scanner: Scanner<R>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut count = 0usize;
    for item in scanner {
        let (offset, record) = item?;
        print_record(offset, &record, json);
        count += 1;
    }
    if !json {
        println!("{count} record(s)");
    }
    Ok(())
}

fn print_record(offset: u64, record: &Record, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "offset": offset, "record": record })
        );
        return;
    }

    match record {
        Record::Block(b) => {
            println!("{offset:>10}  bk  {}  {} data byte(s)", b.versionid, b.data.len());
        }
        Record::PackList(p) => {
            println!(
                "{offset:>10}  ol  {}  upload {:?}  {} pack(s)",
                p.versionid,
                p.uploadid,
                p.packs.len()
            );
            for entry in &p.packs {
                println!(
                    "            [{}]  source {}+{}  pack {}+{}  blocks {:?}",
                    entry.packid,
                    entry.sourcerange.start,
                    entry.sourcerange.len,
                    entry.packrange.start,
                    entry.packrange.len,
                    entry.blocklens,
                );
            }
        }
        Record::Version(v) => {
            let created: DateTime<Utc> = v.versionid.version.datetime().into();
            println!(
                "{offset:>10}  vm  {}  len {}  etag {:?}  created {}",
                v.versionid,
                v.len,
                v.etag,
                created.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            );
            if v.deletemarker || v.nullversion || v.legalhold {
                println!(
                    "            flags: deletemarker={} nullversion={} legalhold={}",
                    v.deletemarker, v.nullversion, v.legalhold
                );
            }
            for clone in &v.clones {
                let data = match &clone.data {
                    CloneData::EmbeddedPacks(packs) => format!("{} embedded pack(s)", packs.len()),
                    CloneData::Reference(r) => {
                        format!("pack list in {} at {}", r.pack, r.packrange.start)
                    }
                    CloneData::Opaque(raw) => format!("{} opaque byte(s)", raw.len()),
                };
                println!("            clone pool {:?}: {}", clone.pool, data);
            }
        }
        Record::VersionDelete(d) => {
            println!("{offset:>10}  vd  {}  deletes {}", d.versionid, d.deleteid);
        }
        Record::MetaFile(m) => {
            println!("{offset:>10}  mf  oldest {}", m.oldest);
        }
    }
}
