//! Property tests for convergence over generated trees, run in memory

use std::path::{Path, PathBuf};

use proptest::prelude::*;
use symclone_core::{Converger, DesiredMetadata, ModeSpec};
use symclone_fs::{FileSystem, MemoryFs};

const SOURCE: &str = "/src";
const DESTINATION: &str = "/work/dst";

#[derive(Debug, Clone)]
struct Planned {
    components: Vec<&'static str>,
    is_file: bool,
}

fn entry_strategy() -> impl Strategy<Value = Planned> {
    (
        prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d.txt"]), 1..4),
        any::<bool>(),
    )
        .prop_map(|(components, is_file)| Planned {
            components,
            is_file,
        })
}

fn desired_strategy() -> impl Strategy<Value = DesiredMetadata> {
    (
        prop::option::of(prop::sample::select(vec!["0755", "0700", "u=rwX,go=rX", "g+w"])),
        prop::option::of(0u32..3),
        prop::option::of(0u32..3),
    )
        .prop_map(|(mode, uid, gid)| DesiredMetadata {
            mode: mode.map(|m| m.parse::<ModeSpec>().unwrap()),
            uid,
            gid,
        })
}

/// Lay out the generated entries; entries colliding with an earlier one are
/// dropped.
fn build_source(plan: &[Planned]) -> MemoryFs {
    let fs = MemoryFs::new();
    fs.create_dir_all(Path::new(SOURCE)).unwrap();
    fs.create_dir_all(Path::new("/work")).unwrap();
    for planned in plan {
        let path = planned
            .components
            .iter()
            .fold(PathBuf::from(SOURCE), |path, c| path.join(c));
        if planned.is_file {
            if let Some(parent) = path.parent()
                && fs.create_dir_all(parent).is_ok()
                && !fs.exists(&path)
            {
                let _ = fs.write_file(&path, "data");
            }
        } else {
            let _ = fs.create_dir_all(&path);
        }
    }
    fs
}

fn state(fs: &MemoryFs) -> Vec<(PathBuf, String)> {
    fs.paths()
        .into_iter()
        .map(|path| {
            let meta = fs.symlink_metadata(&path).unwrap();
            let target = fs.read_link(&path).ok();
            let summary = format!(
                "{:?} {:o} {} {} {:?}",
                meta.kind, meta.mode, meta.uid, meta.gid, target
            );
            (path, summary)
        })
        .collect()
}

proptest! {
    #[test]
    fn second_run_is_a_no_op(
        plan in prop::collection::vec(entry_strategy(), 0..12),
        desired in desired_strategy(),
    ) {
        let fs = build_source(&plan);
        let converger = Converger::new(&fs);

        let first = converger
            .converge(Path::new(SOURCE), Path::new(DESTINATION), &desired)
            .unwrap();
        prop_assert!(first.changed);
        let converged = state(&fs);

        let second = converger
            .converge(Path::new(SOURCE), Path::new(DESTINATION), &desired)
            .unwrap();
        prop_assert!(!second.changed, "unexpected drift: {:?}", second.drift);
        prop_assert_eq!(state(&fs), converged);
    }

    #[test]
    fn destination_only_entries_are_preserved(
        plan in prop::collection::vec(entry_strategy(), 0..12),
        extras in 1usize..4,
        desired in desired_strategy(),
    ) {
        let fs = build_source(&plan);
        fs.create_dir_all(Path::new(DESTINATION)).unwrap();
        for i in 0..extras {
            fs.write_file(&Path::new(DESTINATION).join(format!("zz_extra_{}", i)), "mine")
                .unwrap();
        }
        fs.create_dir_all(&Path::new(DESTINATION).join("zz_private/nested")).unwrap();
        fs.set_mode(&Path::new(DESTINATION).join("zz_private"), 0o711).unwrap();

        Converger::new(&fs)
            .converge(Path::new(SOURCE), Path::new(DESTINATION), &desired)
            .unwrap();

        for i in 0..extras {
            let extra = Path::new(DESTINATION).join(format!("zz_extra_{}", i));
            prop_assert_eq!(fs.read_file(&extra).unwrap(), b"mine".to_vec());
        }
        let private = fs.symlink_metadata(&Path::new(DESTINATION).join("zz_private")).unwrap();
        prop_assert_eq!((private.mode, private.uid, private.gid), (0o711, 1000, 1000));
        prop_assert!(fs.exists(&Path::new(DESTINATION).join("zz_private/nested")));
    }

    #[test]
    fn every_source_entry_is_mirrored_by_type(
        plan in prop::collection::vec(entry_strategy(), 0..12),
    ) {
        let fs = build_source(&plan);

        Converger::new(&fs)
            .converge(Path::new(SOURCE), Path::new(DESTINATION), &DesiredMetadata::unchanged())
            .unwrap();

        for entry in fs.walk(Path::new(SOURCE)).unwrap() {
            let entry = entry.unwrap();
            let mirrored = entry.under(Path::new(DESTINATION));
            let meta = fs.symlink_metadata(&mirrored).unwrap();
            if entry.is_dir() {
                prop_assert!(meta.is_dir(), "{} is not a directory", mirrored.display());
            } else {
                prop_assert_eq!(
                    fs.read_link(&mirrored).unwrap(),
                    entry.under(Path::new(SOURCE))
                );
            }
        }
    }
}
