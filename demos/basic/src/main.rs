use std::{io::Cursor, sync::Arc};

use blobstorage_core::{
    AzureStorage, BlobService, MemoryBlobService, OpenMode, StorageSettings,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let mut settings = StorageSettings::new("example").with_buffer_size(8);
    settings.account_key = "ZGVtby1rZXk=".to_string();
    let storage = AzureStorage::new(settings, |settings| {
        let service: Arc<dyn BlobService> = Arc::new(MemoryBlobService::from_settings(settings));
        Ok(service)
    })?;

    let mut file = storage.open("hello.txt", OpenMode::Write)?;
    file.write_content("Hello from the ")?;
    file.write_content("example crate!")?;
    file.close()?;

    let mut file = storage.open("hello.txt", OpenMode::Read)?;
    println!("{}", String::from_utf8_lossy(&file.read_content()?));
    println!("size: {} bytes", storage.size("hello.txt")?);
    println!("signed url: {}", storage.url("hello.txt", Some(60))?);

    storage.save("notes/readme.txt", &mut Cursor::new(b"saved in one request".to_vec()))?;
    let (dirs, files) = storage.listdir("")?;
    println!("dirs: {dirs:?}, files: {files:?}");

    storage.delete("hello.txt")?;
    Ok(())
}
