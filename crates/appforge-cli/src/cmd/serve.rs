use std::path::Path;

pub fn run(root: &Path, port: u16) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(appforge_server::serve(root.to_path_buf(), port))
}
