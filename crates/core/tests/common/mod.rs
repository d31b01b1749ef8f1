#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Stand-in for exiftool. Every call appends its arguments to `calls.log`.
/// Reads answer with `{"SourceFile": ...}` plus the members stored in a
/// `<image>.meta` sidecar; writes keep a copy of the JSON payload as
/// `write-N.json`. A `fail` file in the directory makes every call exit 1;
/// with a `vanish` file, a write deletes its target images after succeeding.
const FAKE_EXIFTOOL: &str = r#"#!/bin/sh
dir='@DIR@'
echo "$*" >> "$dir/calls.log"
if [ -e "$dir/fail" ]; then
    echo "Error: simulated failure" >&2
    exit 1
fi
for arg in "$@"; do
    case "$arg" in
        -json=*)
            n=$(ls "$dir" | grep -c '^write-')
            cp "${arg#-json=}" "$dir/write-$n.json"
            if [ -e "$dir/vanish" ]; then
                for target in "$@"; do
                    case "$target" in
                        -*) ;;
                        *) [ -f "$target" ] && rm "$target" ;;
                    esac
                done
            fi
            echo "    1 image files updated"
            exit 0
            ;;
    esac
done
mode=other
for arg in "$@"; do
    [ "$arg" = "-json" ] && mode=read
done
[ "$mode" = read ] || exit 0
printf '['
sep=''
for arg in "$@"; do
    case "$arg" in
        -*) continue ;;
    esac
    printf '%s{"SourceFile": "%s"' "$sep" "$arg"
    if [ -f "$arg.meta" ]; then
        printf ', '
        cat "$arg.meta"
    fi
    printf '}'
    sep=','
done
printf ']\n'
"#;

pub struct FakeTool {
    pub dir: PathBuf,
    pub exe: PathBuf,
}

impl FakeTool {
    pub fn install(dir: &Path) -> Self {
        let dir = dir.join("tool");
        fs::create_dir_all(&dir).unwrap();
        let exe = dir.join("exiftool");
        fs::write(&exe, FAKE_EXIFTOOL.replace("@DIR@", dir.to_str().unwrap())).unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, exe }
    }

    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Payloads handed to write calls, oldest first.
    pub fn writes(&self) -> Vec<serde_json::Value> {
        (0..)
            .map(|n| self.dir.join(format!("write-{n}.json")))
            .take_while(|path| path.exists())
            .map(|path| serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap())
            .collect()
    }

    pub fn fail(&self) {
        fs::write(self.dir.join("fail"), b"").unwrap();
    }

    /// Make writes succeed but leave the written files missing.
    pub fn vanish_after_write(&self) {
        fs::write(self.dir.join("vanish"), b"").unwrap();
    }
}

/// Create an image file with distinct content and, when given, the JSON
/// members exiftool should report for it.
pub fn create_image(path: &Path, content: &str, meta: Option<&str>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content.as_bytes()).unwrap();
    if let Some(meta) = meta {
        fs::write(meta_path(path), meta).unwrap();
    }
}

fn meta_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap().to_os_string();
    name.push(".meta");
    path.with_file_name(name)
}
