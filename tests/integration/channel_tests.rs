//! Channel facades agree with the reader they wrap.

use std::sync::Arc;

use tileverse_rangereader::{
    RangeReader, RangeReaderChannel, RangeReaderError, SeekableRangeReaderChannel,
};

use super::test_utils::{pattern, TrackingReader};

#[tokio::test]
async fn test_round_trip_matches_read_range() {
    let data = pattern(10_000);
    let reader = Arc::new(TrackingReader::new(data, "test://roundtrip"));
    let channel = SeekableRangeReaderChannel::new(Arc::clone(&reader));

    for (position, length) in [(0u64, 100usize), (5000, 256), (9990, 100), (10_000, 10)] {
        let expected = reader.read_range(position, length as u64).await.unwrap();

        channel.set_position(position).unwrap();
        let mut buf = vec![0u8; length];
        let n = channel.read(&mut buf).await.unwrap();

        assert_eq!(n, expected.len());
        assert_eq!(&buf[..n], &expected[..]);
    }
}

#[tokio::test]
async fn test_sequential_consumption_to_eof() {
    let data = pattern(1000);
    let reader = TrackingReader::new(data.clone(), "test://seq");
    let channel = RangeReaderChannel::new(reader);

    let mut collected = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = channel.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    assert_eq!(collected, data);
}

#[tokio::test]
async fn test_channel_close_leaves_reader_usable() {
    let data = pattern(100);
    let reader = Arc::new(TrackingReader::new(data.clone(), "test://close"));
    let channel = RangeReaderChannel::new(Arc::clone(&reader));

    channel.close();
    let mut buf = [0u8; 10];
    assert!(matches!(
        channel.read(&mut buf).await,
        Err(RangeReaderError::ChannelClosed(_))
    ));

    // The reader itself is untouched.
    let result = reader.read_range(0, 10).await.unwrap();
    assert_eq!(&result[..], &data[..10]);
}
