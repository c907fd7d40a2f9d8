#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use macrobatch::Manifest;

#[derive(Arbitrary, Debug)]
struct Input {
    text: String,
    block_size: u8,
}

fuzz_target!(|input: Input| {
    let path = std::env::temp_dir().join(format!("fuzz-manifest-{}.csv", std::process::id()));
    if std::fs::write(&path, &input.text).is_err() {
        return;
    }

    if let Ok(manifest) = Manifest::open(&path) {
        let block_size = input.block_size as usize + 1;
        let total: usize = (0..manifest.block_count(block_size))
            .map(|n| manifest.block(n, block_size).len())
            .sum();
        assert_eq!(total, manifest.len());
        for entry in manifest.entries() {
            assert_eq!(entry.targets.len() + 1, manifest.columns());
        }
    }

    std::fs::remove_file(&path).ok();
});
