#![cfg(feature = "context-recovery")]

mod support;

use support::{Assets, CountingDecoder, cache_with, drain};
use texcache_core::{
    CacheSettings, DecodedImage, FontDefinition, HeadlessGpu, PixelFormat,
    TexParams, TextureCache, TextureError, TextureHandle,
};

fn checksums(
    cache: &TextureCache<HeadlessGpu>,
    textures: &[TextureHandle],
) -> Vec<Option<String>> {
    textures
        .iter()
        .map(|t| cache.backend().checksum(t.gpu_id()))
        .collect()
}

#[test]
fn every_kind_of_texture_survives_context_loss() {
    let assets = Assets::new();
    assets.png("file.png", 16, 1);
    assets.png("async.png", 8, 2);
    let decoder = CountingDecoder::default();
    let mut cache = cache_with(&assets, &decoder);

    let file = cache.add_image("file.png").unwrap();
    let raw = cache
        .add_raw_data(None, vec![0x5au8; 4 * 4 * 2], PixelFormat::Rgba4444, 4, 4)
        .unwrap();
    let decoded = cache
        .add_decoded_image(
            DecodedImage::new(2, 2, PixelFormat::I8, vec![1, 2, 3, 4]).unwrap(),
            Some("generated"),
        )
        .unwrap();
    let label = cache
        .add_string_texture("HP 100", &FontDefinition::new("hud.ttf", 14.0))
        .unwrap();
    cache.add_image_async_with("async.png", |_| {});
    drain(&mut cache);
    let loaded = cache.texture_for_key("async.png").unwrap();

    cache.set_tex_params(&file, TexParams::aliased().repeating());

    let textures = vec![file.clone(), raw, decoded, label, loaded];
    let before = checksums(&cache, &textures);
    assert!(before.iter().all(Option::is_some));
    assert_eq!(cache.shadow_registry().len(), textures.len());

    cache.backend_mut().lose_context();
    assert!(checksums(&cache, &textures).iter().all(Option::is_none));

    let report = cache.reload_all_textures();

    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.reloaded, textures.len());
    assert_eq!(checksums(&cache, &textures), before);
    assert_eq!(
        cache.backend().params(file.gpu_id()),
        Some(TexParams::aliased().repeating())
    );
    assert_eq!(file.params(), Some(TexParams::aliased().repeating()));
}

#[test]
fn reload_without_context_loss_is_idempotent() {
    let assets = Assets::new();
    assets.png("stable.png", 8, 3);
    let decoder = CountingDecoder::default();
    let mut cache = cache_with(&assets, &decoder);
    let texture = cache.add_image("stable.png").unwrap();
    let before = cache.backend().checksum(texture.gpu_id());

    cache.reload_all_textures();
    cache.reload_all_textures();

    assert_eq!(cache.backend().checksum(texture.gpu_id()), before);
    assert_eq!(cache.backend().resident_count(), 1);
    assert_eq!(cache.shadow_registry().len(), 1);
}

#[test]
fn missing_source_is_reported_per_texture() {
    let assets = Assets::new();
    let doomed_path = assets.png("doomed.png", 4, 1);
    assets.png("fine.png", 4, 2);
    let decoder = CountingDecoder::default();
    let mut cache = cache_with(&assets, &decoder);

    let doomed = cache.add_image("doomed.png").unwrap();
    let fine = cache.add_image("fine.png").unwrap();
    let fine_before = cache.backend().checksum(fine.gpu_id());

    std::fs::remove_file(&doomed_path).unwrap();
    cache.backend_mut().lose_context();
    let report = cache.reload_all_textures();

    assert_eq!(report.reloaded, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].texture, doomed.id());
    assert!(matches!(
        report.failures[0].error,
        TextureError::PathNotFound(_)
    ));
    assert_eq!(cache.backend().checksum(fine.gpu_id()), fine_before);
}

#[test]
fn records_do_not_outlive_their_textures() {
    let assets = Assets::new();
    assets.png("short.png", 4, 1);
    let decoder = CountingDecoder::default();
    let mut cache = cache_with(&assets, &decoder);

    let texture = cache.add_image("short.png").unwrap();
    let id = texture.id();
    assert!(cache.shadow_registry().record(id).is_some());

    drop(texture);
    cache.remove_texture_for_key("short.png");

    assert!(cache.shadow_registry().record(id).is_none());
    assert!(cache.shadow_registry().is_empty());
    assert_eq!(cache.reload_all_textures().reloaded, 0);
}

#[test]
fn unkeyed_texture_record_goes_away_on_drop() {
    let assets = Assets::new();
    let decoder = CountingDecoder::default();
    let mut cache = cache_with(&assets, &decoder);

    let label = cache
        .add_string_texture("temp", &FontDefinition::new("hud.ttf", 10.0))
        .unwrap();
    assert_eq!(cache.shadow_registry().len(), 1);

    drop(label);
    cache.tick();
    assert!(cache.shadow_registry().is_empty());
}

#[test]
fn runtime_switch_disables_tracking() {
    let assets = Assets::new();
    assets.png("plain.png", 4, 1);
    let decoder = CountingDecoder::default();
    let settings = CacheSettings {
        context_recovery: false,
        ..assets.settings()
    };
    let mut cache = TextureCache::new(HeadlessGpu::new(), settings)
        .with_decoders(decoder.registry());

    let texture = cache.add_image("plain.png").unwrap();
    assert!(cache.shadow_registry().is_empty());

    cache.backend_mut().lose_context();
    let report = cache.reload_all_textures();
    assert_eq!(report.reloaded, 0);
    assert!(cache.backend().checksum(texture.gpu_id()).is_none());
}
