use gif_codec::lzw;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_lzw_round_trip(
        min_code_size in 2u8..=8,
        raw in prop::collection::vec(any::<u8>(), 0..4000),
    ) {
        let mask = ((1u16 << min_code_size) - 1) as u8;
        let indices: Vec<u8> = raw.iter().map(|b| b & mask).collect();

        let packed = lzw::encode(&indices, min_code_size).unwrap();
        let unpacked = lzw::decode(&packed, min_code_size, indices.len()).unwrap();
        prop_assert_eq!(unpacked, indices);
    }

    #[test]
    fn prop_runs_compress(symbol in 0u8..4, len in 64usize..5000) {
        let indices = vec![symbol; len];
        let packed = lzw::encode(&indices, 2).unwrap();
        prop_assert!(packed.len() < len / 2);
    }

    #[test]
    fn prop_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..512), len in 0usize..2048) {
        let _ = lzw::decode(&data, 8, len);
    }
}
