use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use subst_xml::ProcessingConfig;

pub const BACKUP_DIR: &str = "Backup_XML";
pub const VALUE_ABSENT_DIR: &str = "xmls_nao_alterados";
pub const NOT_CHANGED_DIR: &str = "Arquivos_NOT_alterados";

/// Two occurrences of the old value inside the target, one outside it
pub const MODIFIABLE_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<NFe>\n  <infNFe>\n    <xTexto>PreÇo É Caro É</xTexto>\n    <xNome>JOSÉ</xNome>\n  </infNFe>\n</NFe>\n";

pub const MODIFIED_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<NFe>\n  <infNFe>\n    <xTexto>PreÇo E Caro E</xTexto>\n    <xNome>JOSÉ</xNome>\n  </infNFe>\n</NFe>\n";

pub const VALUE_ABSENT_XML: &str = "<NFe><xTexto>Preco Caro</xTexto><xNome>É</xNome></NFe>";

pub const EMPTY_ELEMENT_XML: &str = "<NFe><xTexto>   </xTexto></NFe>";

pub const NO_ELEMENT_XML: &str = "<NFe><xNome>É</xNome></NFe>";

/// Missing the closing root tag; libxml2 recovery fixes it
pub const REPAIRABLE_XML: &str = "<?xml version=\"1.0\"?>\n<NFe><xTexto>Caro É</xTexto>";

/// Nothing any repair strategy can turn into a document
pub const UNREPAIRABLE_XML: &str = "this is not xml at all";

/// Neither libxml2 nor the textual fixes find markup in these bytes
pub const UNREPAIRABLE_BYTES: &[u8] = b"\xC7\x01 sem marca\xE7\xE3o \xFF";

/// Target text split across plain text and a CDATA section
pub const CDATA_XML: &str = "<NFe><xTexto>A É<![CDATA[ É]]> B</xTexto></NFe>";

pub const CDATA_MODIFIED_XML: &str = "<NFe><xTexto>A E E B</xTexto></NFe>";

pub const LATIN1_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n\
<NFe><xTexto>Pre\xC7o \xC9 Caro</xTexto><xNome>JOS\xC9</xNome></NFe>\n";

pub const LATIN1_MODIFIED_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n\
<NFe><xTexto>Pre\xC7o E Caro</xTexto><xNome>JOS\xC9</xNome></NFe>\n";

pub const LATIN1_VALUE_ABSENT_XML: &[u8] =
    b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><NFe><xTexto>Pre\xC7o</xTexto></NFe>";

/// A DOCTYPE without entities or an external subset
pub const DOCTYPE_XML: &str =
    "<?xml version=\"1.0\"?>\n<!DOCTYPE NFe [<!ELEMENT NFe ANY>]>\n<NFe><xTexto>Caro É</xTexto></NFe>";

/// Default settings: É -> E inside xTexto
pub fn default_config() -> ProcessingConfig {
    ProcessingConfig::new("É", "E", "xTexto").unwrap()
}

pub async fn write_file(dir: &Path, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content.as_ref()).await.unwrap();
    path
}

pub async fn read_string(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).await.unwrap()
}

/// Every file under `root`, keyed by relative path, with its bytes
pub async fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let path = entry.path();
            if entry.file_type().await.unwrap().is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                files.insert(relative, fs::read(&path).await.unwrap());
            }
        }
    }

    files
}

/// A working directory with one file per outcome
pub async fn populate_mixed(dir: &Path) {
    write_file(dir, "modified.xml", MODIFIABLE_XML).await;
    write_file(dir, "absent_value.xml", VALUE_ABSENT_XML).await;
    write_file(dir, "empty.xml", EMPTY_ELEMENT_XML).await;
    write_file(dir, "no_element.xml", NO_ELEMENT_XML).await;
    write_file(dir, "repairable.xml", REPAIRABLE_XML).await;
    write_file(dir, "broken.xml", UNREPAIRABLE_XML).await;
    write_file(dir, "readme.txt", "not processed").await;
}
