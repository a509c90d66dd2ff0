/*!
# DSLAM DevKit - Stubs et utilitaires de test du moteur

Permet de tester le moteur sans réseau ni outils système :
- Runner scripté remplaçant ping et nc
- Store défaillant sur commande
- Parcs de DSLAM et fiches d'inventaire prêts à l'emploi
- Harnais assemblant store, runner, ordonnanceur et pipeline
*/

pub mod fixtures;
pub mod flaky_store;
pub mod runner_stub;
pub mod test_utils;

pub use fixtures::{feed_record, DeviceBuilder, FleetBuilder};
pub use flaky_store::FlakyStore;
pub use runner_stub::{ProbeTool, RecordedCall, Script, ScriptedRunner};
pub use test_utils::{fast_config, TestHarness};
