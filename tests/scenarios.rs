//! End-to-end volume scenarios driven purely through the public API.

use std::sync::Arc;

use outpost_fs::configs::BLOCK_BYTE_SIZE;
use outpost_fs::{BlockDevice, MemoryBlockDevice, OutpostFileSystem};

fn fresh_fs(block_count: usize) -> OutpostFileSystem {
    let device: Arc<dyn BlockDevice> = Arc::new(MemoryBlockDevice::new(block_count));
    OutpostFileSystem::new(&device).unwrap()
}

#[test]
fn format_and_inspect() {
    let mut fs = fresh_fs(200);
    assert!(fs.format().is_ok());
    assert!(fs.mount().is_ok());

    let mut dump = String::new();
    assert!(fs.dump(&mut dump).is_ok());
    assert!(dump.contains("magic number is valid"));
    assert!(dump.contains("    200 blocks"));
    assert!(dump.contains("    20 inode blocks"));
    assert!(dump.contains("    2560 inodes"));

    // super block and inode area reserved, the whole data area free
    for block_id in 0..=20 {
        assert_eq!(false, fs.is_block_free(block_id).unwrap());
    }
    for block_id in 21..200 {
        assert_eq!(true, fs.is_block_free(block_id).unwrap());
    }
    assert_eq!(179, fs.free_block_count().unwrap());
}

#[test]
fn create_write_read_round_trip_direct_only() {
    let mut fs = fresh_fs(200);
    fs.format().unwrap();
    fs.mount().unwrap();
    let free_before = fs.free_block_count().unwrap();

    let inumber = fs.create().unwrap();
    assert_eq!(1, inumber);
    assert_eq!(4, fs.write_at(inumber, b"ABCD", 0).unwrap());
    assert_eq!(4, fs.size(inumber).unwrap());

    let mut buffer = [0u8; 4];
    assert_eq!(4, fs.read_at(inumber, &mut buffer, 0).unwrap());
    assert_eq!(b"ABCD", &buffer);
    assert_eq!(free_before - 1, fs.free_block_count().unwrap());
}

#[test]
fn write_spans_into_indirect_region() {
    let mut fs = fresh_fs(2000);
    fs.format().unwrap();
    fs.mount().unwrap();
    let inumber = fs.create().unwrap();

    let head = vec![0xA5u8; 5 * BLOCK_BYTE_SIZE];
    assert_eq!(head.len(), fs.write_at(inumber, &head, 0).unwrap());
    assert_eq!(5 * BLOCK_BYTE_SIZE, fs.size(inumber).unwrap() as usize);

    let tail = vec![0x5Au8; BLOCK_BYTE_SIZE];
    assert_eq!(tail.len(), fs.write_at(inumber, &tail, head.len()).unwrap());
    assert_eq!(6 * BLOCK_BYTE_SIZE, fs.size(inumber).unwrap() as usize);

    let mut buffer = vec![0u8; BLOCK_BYTE_SIZE];
    assert_eq!(
        BLOCK_BYTE_SIZE,
        fs.read_at(inumber, &mut buffer, head.len()).unwrap()
    );
    assert_eq!(tail, buffer);

    // the dump now reports the indirect block of the file
    let mut dump = String::new();
    fs.dump(&mut dump).unwrap();
    assert!(dump.contains("inode 1:"));
    assert!(dump.contains(&format!("    size: {} bytes", 6 * BLOCK_BYTE_SIZE)));
    assert!(!dump.contains("    indirect block: -"));
}

#[test]
fn short_write_when_device_fills_up() {
    // a five block device keeps a single inode area block, leaving
    // exactly three data blocks behind the super block
    let mut fs = fresh_fs(5);
    fs.format().unwrap();
    fs.mount().unwrap();

    let inumber = fs.create().unwrap();
    let payload = vec![7u8; 4 * BLOCK_BYTE_SIZE];
    assert_eq!(
        3 * BLOCK_BYTE_SIZE,
        fs.write_at(inumber, &payload, 0).unwrap()
    );
    assert_eq!(3 * BLOCK_BYTE_SIZE, fs.size(inumber).unwrap() as usize);
    assert_eq!(0, fs.free_block_count().unwrap());

    // every byte the short write reported is durably readable
    let mut buffer = vec![0u8; 4 * BLOCK_BYTE_SIZE];
    assert_eq!(
        3 * BLOCK_BYTE_SIZE,
        fs.read_at(inumber, &mut buffer, 0).unwrap()
    );
    assert!(buffer[..3 * BLOCK_BYTE_SIZE].iter().all(|byte| *byte == 7));
}

#[test]
fn delete_reclaims_blocks_across_remount() {
    let mut fs = fresh_fs(2000);
    fs.format().unwrap();
    fs.mount().unwrap();
    let free_after_mount = fs.free_block_count().unwrap();

    let inumber = fs.create().unwrap();
    let payload = vec![1u8; 6 * BLOCK_BYTE_SIZE];
    assert_eq!(payload.len(), fs.write_at(inumber, &payload, 0).unwrap());
    // six leaves plus the indirect block
    assert_eq!(free_after_mount - 7, fs.free_block_count().unwrap());

    assert!(fs.delete(inumber).is_ok());
    assert_eq!(free_after_mount, fs.free_block_count().unwrap());
    assert!(fs.size(inumber).is_err());

    // rebuilding the free map from disk agrees
    assert!(fs.unmount().is_ok());
    assert!(fs.mount().is_ok());
    assert_eq!(free_after_mount, fs.free_block_count().unwrap());
    assert!(fs.size(inumber).is_err());
}

#[test]
fn bad_arguments_are_rejected() {
    let mut fs = fresh_fs(200);
    fs.format().unwrap();
    fs.mount().unwrap();
    let mut buffer = [0u8; 4];

    assert!(fs.read_at(0, &mut buffer, 0).is_err());
    assert!(fs.read_at(2561, &mut buffer, 0).is_err());
    assert!(fs.delete(999999).is_err());

    let inumber = fs.create().unwrap();
    // a write past the current end of file must not leave any trace
    let free_before = fs.free_block_count().unwrap();
    assert!(fs.write_at(inumber, b"ABCD", 1).is_err());
    assert_eq!(free_before, fs.free_block_count().unwrap());
    assert_eq!(0, fs.size(inumber).unwrap());
}

#[test]
fn mount_state_machine() {
    let mut fs = fresh_fs(200);
    // nothing but format, mount and dump works while unmounted
    assert!(fs.mount().is_err());
    assert!(fs.create().is_err());
    assert!(fs.size(1).is_err());
    assert!(fs.format().is_ok());
    assert!(fs.mount().is_ok());
    // and once mounted, neither format nor a second mount is legal
    assert!(fs.format().is_err());
    assert!(fs.mount().is_err());
    assert!(fs.unmount().is_ok());
    assert!(fs.unmount().is_err());
}
