fn main() {
    implicit_viscosity::start();
}
