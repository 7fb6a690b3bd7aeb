use engine_core::{Buffer, Hashmap, RefCounted, String};

fn main() -> Result<(), engine_core::Error> {
    let mut textures: Hashmap<String, RefCounted<Buffer<u8>>> = Hashmap::new();
    for path in ["textures/stone.png", "textures/grass.png", "textures/sky.png"] {
        let mut pixels = Buffer::new();
        pixels.extend_from_slice(path.as_bytes())?;
        textures.push(String::from(path), RefCounted::new(pixels)?)?;
    }
    let stone = textures.get(b"textures/stone.png".as_slice()).cloned();
    dbg!(textures.len(), textures.capacity());
    dbg!(stone.as_ref().map(RefCounted::ref_count));
    let mut key: String = String::from("textures/");
    key += "sky.png";
    dbg!(&key, textures.contains_key(key.as_bytes()));
    Ok(())
}
