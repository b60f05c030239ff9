#![allow(dead_code)]

use std::fs;
use std::path::Path;

use taxa_merge::config::PipelineConfig;

pub const SPECIES_LIST: &str = "\
species,family,ncbi_taxid
Prionace glauca,Carcharhinidae,7815
Carcharhinus leucas,Carcharhinidae,7807.0
Galeocerdo cuvier,Carcharhinidae,NA
";

pub const REGISTRY: &str = "\
ScientificName,AphiaID,Family
Carcharhinus leucas,105792,Carcharhinidae
Galeocerdo cuvier,105799,Galeocerdonidae
Sphyrna lewini,105819,Sphyrnidae
";

pub const ASSEMBLIES: &str = "\
# genome assembly export
Organism Name,Organism Taxonomic ID,Assembly Accession,Assembly Release Date
Prionace glauca,7815,GCA_000001.1,2019-03-01
Prionace glauca,7815,GCA_000002.1,2022-11-15
Carcharhinus leucas,7807,-,
Rhincodon typus,259920,GCA_000003.1,2017/05/20
";

/// Write the three fixture sources under `root/data` and return a config
/// pointing at them with outputs in `root/output`
pub fn fixture_config(root: &Path) -> PipelineConfig {
    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("species_list.csv"), SPECIES_LIST).unwrap();
    fs::write(data.join("registry.csv"), REGISTRY).unwrap();
    fs::write(data.join("assemblies.csv"), ASSEMBLIES).unwrap();

    let mut config = PipelineConfig {
        output_dir: root.join("output"),
        log_dir: root.join("logs"),
        ..PipelineConfig::default()
    };
    config.sources.species_list.path = data.join("species_list.csv");
    config.sources.registry.path = data.join("registry.csv");
    config.sources.assemblies.path = data.join("assemblies.csv");
    config
}
