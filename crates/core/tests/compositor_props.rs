use folio_core::{compose_blocks, PageImage};
use image::RgbImage;
use proptest::prelude::*;

fn pages_from_heights(heights: &[u32]) -> Vec<PageImage> {
    heights
        .iter()
        .enumerate()
        .map(|(i, h)| PageImage::new(i as u32 + 1, RgbImage::new(3, *h)))
        .collect()
}

proptest! {
    #[test]
    fn blocks_cover_every_page_exactly_once_in_order(
        heights in prop::collection::vec(1u32..60, 0..24),
        max_height in 1u32..120,
    ) {
        let pages = pages_from_heights(&heights);
        let blocks = compose_blocks(&pages, max_height);
        let flattened: Vec<u32> = blocks.iter().flat_map(|b| b.pages.clone()).collect();
        let expected: Vec<u32> = (1..=heights.len() as u32).collect();
        prop_assert_eq!(flattened, expected);
    }

    #[test]
    fn multi_page_blocks_respect_the_height_budget(
        heights in prop::collection::vec(1u32..60, 1..24),
        max_height in 1u32..120,
    ) {
        let pages = pages_from_heights(&heights);
        let blocks = compose_blocks(&pages, max_height);
        for block in &blocks {
            let pasted: u32 = block
                .pages
                .iter()
                .map(|page| heights[(*page - 1) as usize])
                .sum();
            if block.pages.len() > 1 {
                prop_assert!(pasted <= max_height);
            }
            prop_assert!(block.canvas.height() >= pasted.max(1));
        }
    }

    #[test]
    fn block_ids_are_sequential_from_one(
        heights in prop::collection::vec(1u32..60, 0..24),
        max_height in 1u32..120,
    ) {
        let pages = pages_from_heights(&heights);
        let blocks = compose_blocks(&pages, max_height);
        for (i, block) in blocks.iter().enumerate() {
            prop_assert_eq!(block.id, i as u32 + 1);
        }
    }
}
