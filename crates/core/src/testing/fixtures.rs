//! File side effects that mimic the real tools, for use with [`super::Script`].

use std::io;
use std::path::{Path, PathBuf};

use crate::process::CommandSpec;

/// Name of the `index`-th (0-based) frame as ffmpeg numbers them.
pub fn frame_name(index: usize, extension: &str) -> String {
    format!("frame{:08}.{extension}", index + 1)
}

/// Creates an empty file, including missing parent directories.
pub fn touch(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, b"")
}

fn missing(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("missing {what} argument"))
}

fn last_arg(spec: &CommandSpec) -> io::Result<PathBuf> {
    spec.args
        .last()
        .map(PathBuf::from)
        .ok_or_else(|| missing("output"))
}

fn flag_path(spec: &CommandSpec, flag: &str) -> io::Result<PathBuf> {
    spec.arg_after(flag).map(PathBuf::from).ok_or_else(|| missing(flag))
}

/// Frame extraction: writes `count` frames following the `frame%08d.png`
/// pattern in the last argument.
pub fn extract_frames(count: usize) -> impl Fn(&CommandSpec) -> io::Result<()> + Send + Sync {
    move |spec| {
        let pattern = last_arg(spec)?;
        let dir = pattern.parent().ok_or_else(|| missing("frame directory"))?;
        for i in 0..count {
            touch(&dir.join(frame_name(i, "png")))?;
        }
        Ok(())
    }
}

/// Directory enhancement: writes one `-f` file into `-o` per PNG in `-i`,
/// stopping after `limit` files when given.
pub fn enhance_directory(
    limit: Option<usize>,
) -> impl Fn(&CommandSpec) -> io::Result<()> + Send + Sync {
    move |spec| {
        let names = input_frames(spec)?;
        let count = limit.map_or(names.len(), |l| l.min(names.len()));
        for i in 0..count {
            enhance_frame(spec, i)?;
        }
        Ok(())
    }
}

/// Directory enhancement, one frame per call: writes the `index`-th input
/// frame into `-o`. Meant for [`super::Script::with_steps`].
pub fn enhance_frame(spec: &CommandSpec, index: usize) -> io::Result<()> {
    let output = flag_path(spec, "-o")?;
    let format = spec.arg_after("-f").unwrap_or("png");
    let names = input_frames(spec)?;
    match names.get(index) {
        Some(name) => {
            let stem = Path::new(name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            touch(&output.join(format!("{stem}.{format}")))
        }
        None => Ok(()),
    }
}

fn input_frames(spec: &CommandSpec) -> io::Result<Vec<String>> {
    let input = flag_path(spec, "-i")?;
    let mut names: Vec<String> = std::fs::read_dir(input)?
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.to_ascii_lowercase().ends_with(".png"))
        .collect();
    names.sort();
    Ok(names)
}

/// Single-image enhancement: creates the `-o` file.
pub fn write_flag_output(
    flag: &'static str,
) -> impl Fn(&CommandSpec) -> io::Result<()> + Send + Sync {
    move |spec| touch(&flag_path(spec, flag)?)
}

/// ffmpeg transcode or mux: creates the file named by the last argument.
pub fn write_last_arg() -> impl Fn(&CommandSpec) -> io::Result<()> + Send + Sync {
    |spec| touch(&last_arg(spec)?)
}
