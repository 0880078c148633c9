use divan::Bencher;
use subst_xml::{ProcessingConfig, XmlProcessor, XmlRepairer, substitute};

fn main() {
    divan::main();
}

const WELL_FORMED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<NFe>
    <infNFe>
        <xNome>JOSÉ</xNome>
        <xTexto>PreÇo É Caro É</xTexto>
    </infNFe>
</NFe>"#;

const MALFORMED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<NFe>
    <infNFe>
        <xTexto>Tom & Jerry É</xTexto>"#;

fn processor() -> XmlProcessor {
    XmlProcessor::new(ProcessingConfig::new("É", "E", "xTexto").expect("valid settings"))
}

#[divan::bench]
fn evaluate_well_formed(bencher: Bencher) {
    let processor = processor();

    bencher.bench_local(move || processor.evaluate(WELL_FORMED_XML.as_bytes()));
}

#[divan::bench]
fn evaluate_malformed(bencher: Bencher) {
    let processor = processor();

    bencher.bench_local(move || processor.evaluate(MALFORMED_XML.as_bytes()));
}

#[divan::bench]
fn repair_chain(bencher: Bencher) {
    let repairer = XmlRepairer::new();

    bencher.bench_local(move || repairer.repair(MALFORMED_XML.as_bytes()));
}

#[divan::bench(args = [10, 100, 1000])]
fn substitute_long_text(bencher: Bencher, repeats: usize) {
    let text = "PreÇo É Caro ".repeat(repeats);

    bencher.bench_local(|| substitute(&text, "É", "E"));
}

#[divan::bench]
fn run_directory(bencher: Bencher) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let processor = processor();

    bencher
        .with_inputs(|| {
            let dir = tempfile::TempDir::new().expect("temp dir");
            for i in 0..20 {
                std::fs::write(dir.path().join(format!("nota_{i}.xml")), WELL_FORMED_XML)
                    .expect("write sample");
            }
            dir
        })
        .bench_local_values(|dir| {
            runtime
                .block_on(processor.run(dir.path()))
                .expect("run succeeds")
        });
}
