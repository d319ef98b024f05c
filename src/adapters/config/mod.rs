pub mod xml_repository;

pub use xml_repository::XmlManifestRepository;
