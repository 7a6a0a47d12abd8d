use clap::{arg, command, value_parser, ArgMatches};
use disk_driver::cache::CacheDiskDriver;
use disk_driver::file::FileDiskDriver;
use rxattr::xattr_lib::utils::init_logs;
use rxattr::{ImageFs, SetFlags, XattrError, XattrResult, Xattrs};
use std::io::Write;

const CACHE_BLOCKS: usize = 64;

fn main() {
    let matches = command!()
        .arg(arg!(<device> "Image file backing the filesystem"))
        .arg(arg!(--format "Create a fresh image on the device first"))
        .arg(
            arg!(--node <INO> "Inode to operate on")
                .value_parser(value_parser!(u32))
                .default_value("0"),
        )
        .arg(arg!(--list "Print the attribute names of the inode"))
        .arg(arg!(--get <NAME> "Print the value of attribute NAME"))
        .arg(arg!(--set <NAME> "Set attribute NAME to --value"))
        .arg(arg!(--value <VALUE> "Value used by --set").default_value(""))
        .arg(
            arg!(--create "With --set, fail if the attribute already exists")
                .conflicts_with("replace"),
        )
        .arg(arg!(--replace "With --set, fail unless the attribute exists"))
        .arg(arg!(--remove <NAME> "Remove attribute NAME"))
        .arg(arg!(-v --verbose "Debug logging"))
        .get_matches();

    if matches.get_flag("verbose") {
        std::env::set_var("RUST_LOG", "debug");
    }
    init_logs();

    if let Err(e) = run(&matches) {
        eprintln!("rxattr: {}", e);
        std::process::exit(e.errno());
    }
}

fn run(matches: &ArgMatches) -> XattrResult<()> {
    let device = matches
        .get_one::<String>("device")
        .ok_or(XattrError::InvalidRequest)?;
    let ino = *matches
        .get_one::<u32>("node")
        .ok_or(XattrError::InvalidRequest)?;

    let driver = CacheDiskDriver::new(FileDiskDriver::new(), CACHE_BLOCKS);
    let mut fs = ImageFs::new(driver);
    if matches.get_flag("format") {
        fs.format(device)?;
    } else {
        fs.open(device)?;
    }

    let mut inode = fs.get_inode(ino)?;
    {
        let mut xattrs = Xattrs::new(&mut fs);
        if matches.get_flag("list") {
            let mut len = 0;
            xattrs.list(&inode, None, &mut len)?;
            let mut buf = vec![0u8; len];
            xattrs.list(&inode, Some(&mut buf), &mut len)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for name in buf.split(|b| *b == 0).filter(|n| !n.is_empty()) {
                out.write_all(name).map_err(|e| XattrError::Io(e.to_string()))?;
                out.write_all(b"\n").map_err(|e| XattrError::Io(e.to_string()))?;
            }
        }
        if let Some(name) = matches.get_one::<String>("get") {
            let mut len = 0;
            xattrs.get(&inode, name, None, &mut len)?;
            let mut buf = vec![0u8; len];
            xattrs.get(&inode, name, Some(&mut buf), &mut len)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            out.write_all(&buf).map_err(|e| XattrError::Io(e.to_string()))?;
            out.write_all(b"\n").map_err(|e| XattrError::Io(e.to_string()))?;
        }
        if let Some(name) = matches.get_one::<String>("set") {
            let value = matches
                .get_one::<String>("value")
                .ok_or(XattrError::InvalidRequest)?;
            let flags = if matches.get_flag("create") {
                SetFlags::Create
            } else if matches.get_flag("replace") {
                SetFlags::Replace
            } else {
                SetFlags::None
            };
            xattrs.set(&mut inode, name, Some(value.as_bytes()), flags)?;
        }
        if let Some(name) = matches.get_one::<String>("remove") {
            xattrs.set(&mut inode, name, None, SetFlags::None)?;
        }
    }
    fs.set_inode(ino, &inode)?;
    fs.close()?;
    Ok(())
}
