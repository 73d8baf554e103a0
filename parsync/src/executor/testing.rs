//! Scripted stand-in for rsync used by the executor tests.

use crate::rsync::RsyncCommand;
use std::fs;
use tempfile::TempDir;

/// Write a shell script that mimics rsync's output and return a command running it.
///
/// In listing mode (`--dry-run`) it prints one itemized line per `listing`
/// entry plus a progress line, then exits with `listing_exit`. In transfer
/// mode it reads paths from stdin and, per path, prints the name and two
/// progress lines adding 500 bytes each. Paths starting with `fail` make it
/// exit 23; a path starting with `slow` makes it hang.
pub fn fake_rsync(dir: &TempDir, listing: &[&str], listing_exit: i32) -> RsyncCommand {
    let listing_lines: String = listing
        .iter()
        .map(|name| format!(">f+++++++++ {name}\n"))
        .collect();

    let script = format!(
        r#"#!/bin/sh
for arg in "$@"; do
  if [ "$arg" = "--dry-run" ]; then
    printf '          0   0%%    0.00kB/s    0:00:00 (xfr#0, ir-chk=0/{count})\r'
    cat <<'LISTING'
{listing_lines}LISTING
    printf '          0   0%%    0.00kB/s    0:00:00 (xfr#{count}, to-chk=0/{count})\n'
    echo "listing warning" >&2
    exit {listing_exit}
  fi
done
echo "sending incremental file list"
size=0
count=0
status=0
while IFS= read -r path; do
  case "$path" in
    fail*) status=23 ;;
    slow*) exec sleep 30 ;;
  esac
  count=$((count + 1))
  printf '%s\n' "$path"
  size=$((size + 500))
  printf '%10d  50%%  100.00kB/s    0:00:01 (xfr#%d, to-chk=1/2)\r' "$size" "$count"
  size=$((size + 500))
  printf '%10d 100%%  100.00kB/s    0:00:00 (xfr#%d, to-chk=0/2)\r' "$size" "$count"
done
printf '\n'
echo "sent 100 bytes  received 20 bytes  240.00 bytes/sec"
echo "total size is $size  speedup is 1.00"
if [ "$status" -ne 0 ]; then
  echo "rsync error: some files/attrs were not transferred (code 23)" >&2
fi
exit $status
"#,
        count = listing.len(),
    );

    let path = dir.path().join("fake-rsync.sh");
    fs::write(&path, script).unwrap();

    RsyncCommand::from_args(["-a", "src", "dst"])
        .unwrap()
        .with_program("/bin/sh", vec![path.display().to_string()])
}
