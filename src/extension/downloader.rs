use crate::extension::Extension;
use crate::host::Host;

pub const DOWNLOAD_ACTION: &str = "gpq.download";

/// The real extension. Only its host wiring lives here.
#[derive(Debug, Default)]
pub struct GeoParquetDownloader;

impl GeoParquetDownloader {
    pub fn new() -> Self {
        Self
    }

    /// Toolbar / `:gpq` handler.
    pub fn run(&mut self, host: &mut Host) {
        tracing::info!("GeoParquet download requested");
        host.message_bar
            .push_info("GeoParquet Downloader", "Choose a GeoParquet source to download.");
    }
}

impl Extension for GeoParquetDownloader {
    fn init_gui(&mut self, host: &mut Host) {
        host.add_toolbar_action(DOWNLOAD_ACTION, "Download GeoParquet");
    }

    fn unload(&mut self, host: &mut Host) {
        host.remove_toolbar_action(DOWNLOAD_ACTION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::host_in;

    #[test]
    fn run_prompts_for_a_source() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _rx) = host_in(dir.path());
        let mut downloader = GeoParquetDownloader::new();

        downloader.init_gui(&mut host);
        downloader.run(&mut host);

        assert_eq!(host.toolbar()[0].id, DOWNLOAD_ACTION);
        let last = host.message_bar.iter().last().unwrap();
        assert_eq!(last.title, "GeoParquet Downloader");
    }
}
