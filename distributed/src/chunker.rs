//! Splits the input into contiguous part files, one per worker.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    ops::Range,
    path::{Path, PathBuf},
};

use csv::{ByteRecord, Position};
use itertools::Itertools;
use pharmacy_common::{
    record::{check_header, FIRST_DATA_LINE},
    Error, Result,
};
use tracing::{debug, info, warn};

/// One contiguous run of input records, materialized as its own CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub path: PathBuf,
    /// Line number, in the original input, where the first record starts.
    pub first_line: u64,
    pub records: usize,
}

/// Index ranges for `n` partitions over `total` records.
///
/// Every range but the last holds `total / n` records, the last one takes the
/// remainder. With fewer records than partitions the count drops to one
/// record per partition; no records at all still gives a single empty range.
pub fn partition_bounds(total: usize, n: usize) -> Vec<Range<usize>> {
    let n = n.clamp(1, total.max(1));
    let chunk = total / n;
    (0..n)
        .map(|k| {
            let start = k * chunk;
            let end = if k + 1 == n { total } else { start + chunk };
            start..end
        })
        .collect_vec()
}

fn part_path(work_dir: &Path, index: usize) -> PathBuf {
    work_dir.join(format!("part-{}.csv", index + 1))
}

fn write_part(path: &Path, header: &[u8], body: &[u8]) -> Result<()> {
    let io_err = |err| Error::io(path, err);
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    out.write_all(header).map_err(io_err)?;
    out.write_all(body).map_err(io_err)?;
    out.flush().map_err(io_err)
}

/// Where each record starts, plus the end of the header.
///
/// Records are found with a CSV scan rather than by splitting on newlines, so
/// a quoted field spanning several lines is never cut in two.
struct RecordIndex {
    header_end: Position,
    starts: Vec<Position>,
}

fn scan_records(contents: &[u8], input: &Path) -> Result<RecordIndex> {
    let csv_err = |source| Error::Csv {
        path: input.to_path_buf(),
        source,
    };
    // field counts are checked by the aggregators, with the right line numbers
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents);
    check_header(reader.headers().map_err(csv_err)?, input)?;
    let header_end = reader.position().clone();

    let mut starts = Vec::new();
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record).map_err(csv_err)? {
        if let Some(pos) = record.position() {
            starts.push(pos.clone());
        }
    }
    Ok(RecordIndex { header_end, starts })
}

/// Reads `input`, checks its header and writes `n` part files into `work_dir`.
///
/// Each part file starts with the header bytes of `input`, unchanged, so it can
/// be read on its own and counts lines the same way the input does.
pub fn split_input(input: &Path, work_dir: &Path, n: usize) -> Result<Vec<Partition>> {
    info!("Loading input file: {}", input.display());
    let contents = fs::read(input).map_err(|err| Error::io(input, err))?;
    let RecordIndex { header_end, starts } = scan_records(&contents, input)?;
    info!(
        "Successfully loaded input file: {} ({} records)",
        input.display(),
        starts.len()
    );

    let header = &contents[..header_end.byte() as usize];
    let eof = (contents.len() as u64, header_end.line());
    let boundary = |i: usize| {
        starts
            .get(i)
            .map_or(eof, |pos| (pos.byte(), pos.line()))
    };
    // csv lines to input lines, the first record being FIRST_DATA_LINE
    let input_line = |line: u64| FIRST_DATA_LINE + line.saturating_sub(header_end.line());

    fs::create_dir_all(work_dir).map_err(|err| Error::io(work_dir, err))?;
    let partitions = partition_bounds(starts.len(), n)
        .into_iter()
        .enumerate()
        .map(|(index, range)| -> Result<Partition> {
            let path = part_path(work_dir, index);
            let (from, first_line) = boundary(range.start);
            let (to, _) = boundary(range.end);
            write_part(&path, header, &contents[from as usize..to as usize])?;
            debug!("wrote {} ({} records)", path.display(), range.len());
            Ok(Partition {
                index,
                path,
                first_line: input_line(first_line),
                records: range.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Created the following part files: {:?}",
        partitions.iter().map(|p| p.path.display()).collect_vec()
    );
    Ok(partitions)
}

/// Deletes the part files, then `work_dir` itself if nothing else is left in it.
pub fn remove_partitions(work_dir: &Path, partitions: &[Partition]) -> Result<()> {
    for partition in partitions {
        info!("Removing part file: {}", partition.path.display());
        fs::remove_file(&partition.path).map_err(|err| Error::io(&partition.path, err))?;
    }
    if let Err(err) = fs::remove_dir(work_dir) {
        warn!("Keeping work directory {}: {err}", work_dir.display());
    }
    info!("Part files removed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition<T>(items: &[T], n: usize) -> Vec<&[T]> {
        partition_bounds(items.len(), n)
            .into_iter()
            .map(|range| &items[range])
            .collect_vec()
    }

    #[test]
    fn test_partition_bounds_sizes() {
        assert_eq!(partition_bounds(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(partition_bounds(9, 3), vec![0..3, 3..6, 6..9]);
        assert_eq!(partition_bounds(10, 1), vec![0..10]);
        assert_eq!(partition_bounds(4, 4), vec![0..1, 1..2, 2..3, 3..4]);
    }

    #[test]
    fn test_fewer_lines_than_partitions() {
        assert_eq!(partition_bounds(2, 8), vec![0..1, 1..2]);
        assert_eq!(partition_bounds(0, 8), vec![0..0]);
        assert_eq!(partition_bounds(0, 1), vec![0..0]);
    }

    #[test]
    fn test_zero_partitions_means_one() {
        assert_eq!(partition_bounds(5, 0), vec![0..5]);
    }

    #[test]
    fn test_partitions_are_complete() {
        for total in 0..40 {
            let items = (0..total).collect_vec();
            for n in 1..10 {
                let parts = partition(&items, n);
                assert_eq!(parts.len(), n.min(total.max(1)));
                assert_eq!(parts.concat(), items, "total = {total}, n = {n}");
                if total >= n {
                    assert!(parts.iter().all(|p| !p.is_empty()));
                    let chunk = total / n;
                    assert!(parts[..n - 1].iter().all(|p| p.len() == chunk));
                }
            }
        }
    }

    #[test]
    fn test_split_input_writes_parts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        fs::write(
            &input,
            "id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost\n\
             1,A,A,X,1\n2,B,B,X,2\n3,C,C,Y,3\n4,D,D,Y,4\n5,E,E,Z,5\n",
        )
        .unwrap();
        let work_dir = dir.path().join("work");

        let parts = split_input(&input, &work_dir, 2).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!((parts[0].first_line, parts[0].records), (2, 2));
        assert_eq!((parts[1].first_line, parts[1].records), (4, 3));
        assert_eq!(
            fs::read_to_string(&parts[1].path).unwrap(),
            "id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost\n\
             3,C,C,Y,3\n4,D,D,Y,4\n5,E,E,Z,5\n"
        );

        remove_partitions(&work_dir, &parts).unwrap();
        assert!(!work_dir.exists());
    }

    #[test]
    fn test_split_input_keeps_multiline_records_whole() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        fs::write(
            &input,
            "id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost\n\
             1,A,B,X,2.0\n2,C,D,\"SALT\nTABLE\",1.0\n3,E,F,X,3.0\n",
        )
        .unwrap();
        let work_dir = dir.path().join("work");

        let parts = split_input(&input, &work_dir, 3).unwrap();
        assert_eq!(
            parts
                .iter()
                .map(|p| (p.first_line, p.records))
                .collect_vec(),
            [(2, 1), (3, 1), (5, 1)]
        );
        assert_eq!(
            fs::read_to_string(&parts[1].path).unwrap(),
            "id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost\n\
             2,C,D,\"SALT\nTABLE\",1.0\n"
        );
        assert_eq!(
            fs::read_to_string(&parts[2].path).unwrap(),
            "id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost\n\
             3,E,F,X,3.0\n"
        );
    }

    #[test]
    fn test_split_input_without_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        fs::write(
            &input,
            "id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost\r\n\
             1,A,B,X,2.0\r\n2,C,D,Y,1.0",
        )
        .unwrap();

        let parts = split_input(&input, &dir.path().join("work"), 2).unwrap();
        assert_eq!(
            parts
                .iter()
                .map(|p| (p.first_line, p.records))
                .collect_vec(),
            [(2, 1), (3, 1)]
        );
        assert!(fs::read_to_string(&parts[1].path)
            .unwrap()
            .ends_with("2,C,D,Y,1.0"));
    }

    #[test]
    fn test_split_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        fs::write(
            &input,
            "id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost",
        )
        .unwrap();

        let parts = split_input(&input, &dir.path().join("work"), 4).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].records, 0);
        assert_eq!(
            fs::read_to_string(&parts[0].path).unwrap(),
            "id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost"
        );
    }

    #[test]
    fn test_split_input_rejects_bad_header() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        let work_dir = dir.path().join("work");

        fs::write(&input, "").unwrap();
        let err = split_input(&input, &work_dir, 2).unwrap_err();
        assert!(matches!(err, Error::EmptyInput { .. }), "{err:?}");

        fs::write(&input, "id,drug_name,drug_cost\n1,X,1\n").unwrap();
        let err = split_input(&input, &work_dir, 2).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader { .. }), "{err:?}");
        assert!(!work_dir.exists());
    }

    #[test]
    fn test_split_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = split_input(&dir.path().join("nope.csv"), dir.path(), 2).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{err:?}");
    }
}
